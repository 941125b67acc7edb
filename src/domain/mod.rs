//! Framework-agnostic settlement domain: entities, closed state enums and the
//! pure rules for promo evaluation, pricing, refunds and payouts.

pub mod audit;
pub mod checkout;
pub mod course;
pub mod pricing;
pub mod promo;
pub mod transaction;
pub mod withdrawal;

pub use audit::AuditEntry;
pub use checkout::{Checkout, CheckoutState, PaymentOutcome};
pub use course::{Course, Enrollment};
pub use pricing::CheckoutTotals;
pub use promo::{DiscountType, PromoCode, PromoDiscount, PromoRejection};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use withdrawal::{WithdrawalRequest, WithdrawalStatus};
