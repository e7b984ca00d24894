use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::item::{BoardItem, ItemUpdate, NewItem};
use super::order_key::OrderKey;
use crate::PictogramId;
use crate::config::defaults::DEFAULT_BOARD_MAX_ITEMS;
use crate::errors::{CapacityError, NotFoundError};

/// Result of a `move_item` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub from: usize,
    pub to: usize,
    /// Items whose order key changed
    pub rekeyed: usize,
    pub compacted: bool,
}

/// Immutable view of a board at one point in time
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub title: String,
    pub items: Arc<[BoardItem]>,
}

impl BoardSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pictogram_ids(&self) -> Vec<PictogramId> {
        self.items.iter().filter_map(|i| i.pictogram_id).collect()
    }
}

/// Ordered board of items
///
/// `items` is kept sorted by `order_key`, so index order and key order are
/// the same thing; every mutation preserves unique, strictly increasing keys.
#[derive(Debug, Clone)]
pub struct Board {
    title: String,
    items: Vec<BoardItem>,
    max_items: usize,
    compactions: u64,
}

impl Board {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_capacity(title, DEFAULT_BOARD_MAX_ITEMS)
    }

    pub fn with_capacity(title: impl Into<String>, max_items: usize) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
            max_items,
            compactions: 0,
        }
    }

    /// Rebuild from persisted items; caller has already validated key order
    pub(crate) fn from_parts(title: String, items: Vec<BoardItem>, max_items: usize) -> Self {
        Self {
            title,
            items,
            max_items,
            compactions: 0,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn items(&self) -> &[BoardItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// How many full re-keying passes have run on this board
    pub fn compactions(&self) -> u64 {
        self.compactions
    }

    pub fn get(&self, id: Uuid) -> Option<&BoardItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn position_of(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// Item at a 0-based display position
    pub fn item_at(&self, position: usize) -> Result<&BoardItem, NotFoundError> {
        self.items.get(position).ok_or(NotFoundError::Position {
            position,
            len: self.items.len(),
        })
    }

    /// Insert at `position` (clamped to the end) and return the new item's id
    pub fn insert(&mut self, item: NewItem, position: usize) -> Result<Uuid, CapacityError> {
        if self.items.len() >= self.max_items {
            return Err(CapacityError {
                board: self.title.clone(),
                max_items: self.max_items,
            });
        }

        let position = position.min(self.items.len());
        let key = self.key_for_slot(position);
        let item = item.into_item(key.unwrap_or(OrderKey::new(0)));
        let id = item.id;
        self.items.insert(position, item);

        if key.is_none() {
            self.compact();
        }
        debug!("Inserted item {} at position {} on '{}'", id, position, self.title);
        Ok(id)
    }

    pub fn push(&mut self, item: NewItem) -> Result<Uuid, CapacityError> {
        self.insert(item, self.items.len())
    }

    /// Move an item to `to_position` (clamped to the last slot)
    ///
    /// Only the moved item is re-keyed unless its new neighbours are adjacent
    /// keys, in which case the whole board is compacted.
    pub fn move_item(&mut self, id: Uuid, to_position: usize) -> Result<MoveOutcome, NotFoundError> {
        let from = self.position_of(id).ok_or(NotFoundError::Item(id))?;
        let to = to_position.min(self.items.len() - 1);
        if from == to {
            return Ok(MoveOutcome {
                from,
                to,
                rekeyed: 0,
                compacted: false,
            });
        }

        let mut item = self.items.remove(from);
        let key = self.key_for_slot(to);
        let compacted = key.is_none();
        if let Some(key) = key {
            item.order_key = key;
        }
        self.items.insert(to, item);

        let rekeyed = if compacted { self.compact() } else { 1 };
        debug!(
            "Moved item {} from {} to {} on '{}' ({} re-keyed)",
            id, from, to, self.title, rekeyed
        );
        Ok(MoveOutcome {
            from,
            to,
            rekeyed,
            compacted,
        })
    }

    pub fn remove(&mut self, id: Uuid) -> Result<BoardItem, NotFoundError> {
        let position = self.position_of(id).ok_or(NotFoundError::Item(id))?;
        Ok(self.items.remove(position))
    }

    pub fn update(&mut self, id: Uuid, update: ItemUpdate) -> Result<&BoardItem, NotFoundError> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(NotFoundError::Item(id))?;
        update.apply(item);
        Ok(item)
    }

    pub fn set_done(&mut self, id: Uuid, done: bool) -> Result<(), NotFoundError> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(NotFoundError::Item(id))?;
        item.done = done;
        Ok(())
    }

    /// Mark every item not done
    pub fn reset_progress(&mut self) {
        for item in &mut self.items {
            item.done = false;
        }
    }

    /// First item not yet done
    pub fn current_activity(&self) -> Option<&BoardItem> {
        self.items.iter().find(|item| !item.done)
    }

    /// First item not yet done after `after`
    pub fn next_activity(&self, after: Uuid) -> Option<&BoardItem> {
        let position = self.position_of(after)?;
        self.items[position + 1..].iter().find(|item| !item.done)
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            title: self.title.clone(),
            items: self.items.iter().cloned().collect(),
        }
    }

    /// Reassign every key to `(i + 1) * KEY_GAP`; returns the number of
    /// items whose key changed
    pub fn compact(&mut self) -> usize {
        let mut changed = 0;
        for (index, item) in self.items.iter_mut().enumerate() {
            let key = OrderKey::spaced(index);
            if item.order_key != key {
                item.order_key = key;
                changed += 1;
            }
        }
        self.compactions += 1;
        info!(
            "Compacted order keys on '{}': {} of {} items re-keyed",
            self.title,
            changed,
            self.items.len()
        );
        changed
    }

    /// Key for an item about to occupy `position` in `items` (where the
    /// item is not currently present)
    fn key_for_slot(&self, position: usize) -> Option<OrderKey> {
        let lower = position
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .map(|item| item.order_key);
        let upper = self.items.get(position).map(|item| item.order_key);
        OrderKey::between(lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::order_key::KEY_GAP;
    use chrono::NaiveTime;
    use proptest::prelude::*;

    fn labels(board: &Board) -> Vec<&str> {
        board.items().iter().map(|i| i.label.as_str()).collect()
    }

    fn assert_strictly_ordered(board: &Board) {
        for pair in board.items().windows(2) {
            assert!(pair[0].order_key < pair[1].order_key);
        }
    }

    fn abc() -> (Board, Uuid, Uuid, Uuid) {
        let mut board = Board::new("Morning");
        let a = board.push(NewItem::new("A")).unwrap();
        let b = board.push(NewItem::new("B")).unwrap();
        let c = board.push(NewItem::new("C")).unwrap();
        (board, a, b, c)
    }

    #[test]
    fn test_move_last_to_front_rekeys_only_moved_item() {
        let (mut board, a, b, c) = abc();
        let before_a = board.get(a).unwrap().order_key;
        let before_b = board.get(b).unwrap().order_key;

        let outcome = board.move_item(c, 0).unwrap();

        assert_eq!(labels(&board), vec!["C", "A", "B"]);
        assert_eq!(outcome.rekeyed, 1);
        assert!(!outcome.compacted);
        assert_eq!(board.get(a).unwrap().order_key, before_a);
        assert_eq!(board.get(b).unwrap().order_key, before_b);
        assert_strictly_ordered(&board);
    }

    #[test]
    fn test_item_at_out_of_range() {
        let (board, a, _, _) = abc();
        assert_eq!(board.item_at(0).unwrap().id, a);
        assert!(matches!(
            board.item_at(3),
            Err(NotFoundError::Position { position: 3, len: 3 })
        ));
    }

    #[test]
    fn test_move_to_same_position_is_noop() {
        let (mut board, _, b, _) = abc();
        let outcome = board.move_item(b, 1).unwrap();
        assert_eq!(outcome.rekeyed, 0);
        assert_eq!(labels(&board), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_move_past_end_clamps() {
        let (mut board, a, _, _) = abc();
        board.move_item(a, 99).unwrap();
        assert_eq!(labels(&board), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_exhausted_gap_triggers_compaction() {
        let (mut board, a, b, _) = abc();

        // ping-pong between the same neighbours until the gap runs out
        let mut compacted = false;
        for round in 0..64 {
            let mover = if round % 2 == 0 { a } else { b };
            let outcome = board.move_item(mover, 0).unwrap();
            assert_strictly_ordered(&board);
            if outcome.compacted {
                compacted = true;
                break;
            }
        }
        // moving in front of a key near zero halves toward zero
        assert!(compacted);
        assert_eq!(board.compactions(), 1);
        assert_eq!(board.items()[0].order_key, OrderKey::spaced(0));
        assert_eq!(board.items()[2].order_key.value(), 3 * KEY_GAP);
    }

    #[test]
    fn test_insert_between_neighbours() {
        let (mut board, _, _, _) = abc();
        board.insert(NewItem::new("AB"), 1).unwrap();
        assert_eq!(labels(&board), vec!["A", "AB", "B", "C"]);
        assert_strictly_ordered(&board);
    }

    #[test]
    fn test_capacity_error() {
        let mut board = Board::with_capacity("Tiny", 2);
        board.push(NewItem::new("one")).unwrap();
        board.push(NewItem::new("two")).unwrap();
        let err = board.push(NewItem::new("three")).unwrap_err();
        assert_eq!(err.max_items, 2);
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn test_remove_missing_item() {
        let (mut board, a, _, _) = abc();
        board.remove(a).unwrap();
        assert_eq!(labels(&board), vec!["B", "C"]);
        assert_eq!(board.remove(a).unwrap_err(), NotFoundError::Item(a));
        assert!(board.move_item(a, 0).is_err());
    }

    #[test]
    fn test_update_and_done_tracking() {
        let (mut board, a, b, c) = abc();
        board
            .update(
                b,
                ItemUpdate {
                    label: Some("Breakfast".to_string()),
                    pictogram_id: Some(Some(4625)),
                    time: Some(NaiveTime::from_hms_opt(6, 45, 0)),
                    ..ItemUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(board.get(b).unwrap().label, "Breakfast");
        assert_eq!(board.get(b).unwrap().pictogram_id, Some(4625));

        board.set_done(a, true).unwrap();
        assert_eq!(board.current_activity().map(|i| i.id), Some(b));
        assert_eq!(board.next_activity(b).map(|i| i.id), Some(c));

        board.set_done(c, true).unwrap();
        assert!(board.next_activity(b).is_none());

        board.reset_progress();
        assert_eq!(board.current_activity().map(|i| i.id), Some(a));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let (mut board, a, _, _) = abc();
        let snapshot = board.snapshot();
        board.remove(a).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(board.len(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(usize),
        Move(usize, usize),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..40).prop_map(Op::Insert),
            (0usize..40, 0usize..40).prop_map(|(a, b)| Op::Move(a, b)),
            (0usize..40).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn test_random_edits_keep_strict_order(ops in prop::collection::vec(op(), 1..200)) {
            let mut board = Board::with_capacity("prop", 30);
            let mut model: Vec<Uuid> = Vec::new();

            for op in ops {
                match op {
                    Op::Insert(pos) => {
                        if let Ok(id) = board.insert(NewItem::new("x"), pos) {
                            model.insert(pos.min(model.len()), id);
                        }
                    }
                    Op::Move(from, to) if !model.is_empty() => {
                        let id = model.remove(from % model.len());
                        let to = to.min(model.len());
                        model.insert(to, id);
                        board.move_item(id, to).unwrap();
                    }
                    Op::Remove(pos) if !model.is_empty() => {
                        let id = model.remove(pos % model.len());
                        board.remove(id).unwrap();
                    }
                    _ => {}
                }

                let ids: Vec<Uuid> = board.items().iter().map(|i| i.id).collect();
                prop_assert_eq!(&ids, &model);
                for pair in board.items().windows(2) {
                    prop_assert!(pair[0].order_key < pair[1].order_key);
                }
                prop_assert!(board.len() <= 30);
            }
        }
    }
}
