//! Built-in daily schedule templates

use chrono::NaiveTime;
use std::collections::BTreeSet;

use super::item::NewItem;
use super::model::Board;
use crate::PictogramId;
use crate::errors::{CapacityError, NotFoundError};

#[derive(Debug, Clone, Copy)]
pub struct TemplateItem {
    pub label: &'static str,
    /// `(hour, minute)`
    pub time: (u32, u32),
    pub duration_minutes: u32,
    pub category: &'static str,
    pub pictogram_id: PictogramId,
}

#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub name: &'static str,
    pub items: &'static [TemplateItem],
}

const fn item(
    label: &'static str,
    time: (u32, u32),
    duration_minutes: u32,
    category: &'static str,
    pictogram_id: PictogramId,
) -> TemplateItem {
    TemplateItem {
        label,
        time,
        duration_minutes,
        category,
        pictogram_id,
    }
}

const WAKE_UP: PictogramId = 8988;
const BREAKFAST: PictogramId = 4625;
const GET_DRESSED: PictogramId = 2781;
const BRUSH_TEETH: PictogramId = 2326;
const SCHOOL: PictogramId = 3082;
const LUNCH: PictogramId = 4609;
const COME_HOME: PictogramId = 6964;
const SNACK: PictogramId = 4694;
const PLAY: PictogramId = 11653;
const DINNER: PictogramId = 4592;
const EVENING_ROUTINE: PictogramId = 6942;
const BEDTIME: PictogramId = 6027;
const REST: PictogramId = 3299;

const SCHOOL_DAY: &[TemplateItem] = &[
    item("Wake up", (6, 30), 15, "morning", WAKE_UP),
    item("Breakfast", (6, 45), 20, "meals", BREAKFAST),
    item("Get dressed", (7, 5), 15, "morning", GET_DRESSED),
    item("Brush teeth", (7, 20), 10, "hygiene", BRUSH_TEETH),
    item("Go to school", (7, 30), 30, "transport", SCHOOL),
    item("School", (8, 0), 360, "school", SCHOOL),
    item("Lunch", (11, 30), 30, "meals", LUNCH),
    item("Come home", (14, 0), 30, "transport", COME_HOME),
    item("Snack", (14, 30), 15, "meals", SNACK),
    item("Play", (14, 45), 60, "play", PLAY),
    item("Dinner", (17, 30), 30, "meals", DINNER),
    item("Evening routine", (19, 0), 30, "evening", EVENING_ROUTINE),
    item("Brush teeth", (19, 30), 10, "hygiene", BRUSH_TEETH),
    item("Bedtime", (19, 45), 15, "evening", BEDTIME),
];

const WEEKEND: &[TemplateItem] = &[
    item("Wake up", (8, 0), 15, "morning", WAKE_UP),
    item("Breakfast", (8, 15), 30, "meals", BREAKFAST),
    item("Get dressed", (8, 45), 15, "morning", GET_DRESSED),
    item("Play", (9, 0), 120, "play", PLAY),
    item("Lunch", (12, 0), 30, "meals", LUNCH),
    item("Rest", (12, 30), 60, "rest", REST),
    item("Play", (14, 0), 120, "play", PLAY),
    item("Snack", (16, 0), 15, "meals", SNACK),
    item("Dinner", (17, 30), 30, "meals", DINNER),
    item("Evening routine", (19, 0), 30, "evening", EVENING_ROUTINE),
    item("Bedtime", (20, 0), 15, "evening", BEDTIME),
];

const HOLIDAY: &[TemplateItem] = &[
    item("Wake up", (8, 30), 15, "morning", WAKE_UP),
    item("Breakfast", (8, 45), 30, "meals", BREAKFAST),
    item("Get dressed", (9, 15), 15, "morning", GET_DRESSED),
    item("Play", (9, 30), 120, "play", PLAY),
    item("Lunch", (12, 0), 30, "meals", LUNCH),
    item("Rest", (12, 30), 60, "rest", REST),
    item("Play", (14, 0), 180, "play", PLAY),
    item("Dinner", (17, 30), 30, "meals", DINNER),
    item("Evening routine", (19, 30), 30, "evening", EVENING_ROUTINE),
    item("Bedtime", (20, 30), 15, "evening", BEDTIME),
];

pub const BUILTIN_TEMPLATES: &[Template] = &[
    Template {
        name: "School Day",
        items: SCHOOL_DAY,
    },
    Template {
        name: "Weekend",
        items: WEEKEND,
    },
    Template {
        name: "Holiday",
        items: HOLIDAY,
    },
];

impl Template {
    /// Case-insensitive lookup among the built-in templates
    pub fn find(name: &str) -> Result<&'static Template, NotFoundError> {
        BUILTIN_TEMPLATES
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| NotFoundError::Template(name.to_string()))
    }

    /// Distinct pictograms referenced by this template, for prefetching
    pub fn pictogram_ids(&self) -> BTreeSet<PictogramId> {
        self.items.iter().map(|i| i.pictogram_id).collect()
    }
}

impl TemplateItem {
    pub fn to_new_item(&self) -> NewItem {
        let mut new_item = NewItem::new(self.label)
            .with_pictogram(self.pictogram_id)
            .with_category(self.category)
            .with_duration(self.duration_minutes);
        new_item.time = NaiveTime::from_hms_opt(self.time.0, self.time.1, 0);
        new_item
    }
}

/// Pictograms used by any built-in template
pub fn all_template_pictograms() -> BTreeSet<PictogramId> {
    BUILTIN_TEMPLATES
        .iter()
        .flat_map(|t| t.pictogram_ids())
        .collect()
}

impl Board {
    pub fn from_template(template: &Template, max_items: usize) -> Result<Self, CapacityError> {
        let mut board = Board::with_capacity(template.name, max_items);
        for item in template.items {
            board.push(item.to_new_item())?;
        }
        Ok(board)
    }
}
