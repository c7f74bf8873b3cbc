// Voucher module
// Discount codes for event bookings and blocks: validation, discounting and
// recording redemptions

pub mod discount;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod rules;
pub mod service;

pub use error::VoucherError;
pub use models::{UsedVoucher, Voucher, VoucherKind, VoucherQuote};
pub use repository::{PgVoucherRepository, VoucherRepository};
pub use service::VoucherService;
