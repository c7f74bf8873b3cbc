// Block module
// Prepaid class blocks: picking a block for a booking, free classes earned on
// completing a block and transfer credits for cancelled classes

pub mod allocation;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod service;

pub use error::BlockError;
pub use models::{Block, BlockState, BlockType, Booking, BookingStatus, Event, EventCategory, EventType};
pub use repository::{BlockRepository, PgBlockRepository};
pub use service::BlockService;
