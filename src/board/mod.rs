//! Board model
//!
//! A board is an ordered list of cards (label, optional pictogram, schedule
//! metadata). Display order is carried by sparse [`OrderKey`]s so that
//! inserting or moving a card normally re-keys only that card.

pub mod item;
pub mod model;
pub mod order_key;
pub mod persistence;
pub mod templates;

pub use item::{BoardItem, ItemUpdate, NewItem};
pub use model::{Board, BoardSnapshot, MoveOutcome};
pub use order_key::{KEY_GAP, OrderKey};
pub use persistence::{BOARD_FORMAT_VERSION, BoardStore};
pub use templates::{BUILTIN_TEMPLATES, Template, TemplateItem, all_template_pictograms};
