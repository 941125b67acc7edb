//! Row types for SQLx. Enum columns are stored as text and parsed on the way
//! out, so a row that no longer matches the domain surfaces as `Corrupt`
//! instead of panicking.

use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    Checkout, Course, Enrollment, PromoCode, Transaction, WithdrawalRequest,
};
use crate::ports::{RepositoryError, RepositoryResult};

fn parse_column<T>(value: &str) -> RepositoryResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| RepositoryError::Corrupt(e.to_string()))
}

#[derive(Debug, FromRow)]
pub struct CourseRow {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub title: String,
    pub price: BigDecimal,
    pub is_published: bool,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Course {
            id: row.id,
            instructor_id: row.instructor_id,
            title: row.title,
            price: row.price,
            is_published: row.is_published,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PromoCodeRow {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: BigDecimal,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub min_cart_value: Option<BigDecimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromoCodeRow {
    pub fn into_domain(self) -> RepositoryResult<PromoCode> {
        Ok(PromoCode {
            id: self.id,
            code: self.code,
            discount_type: parse_column(&self.discount_type)?,
            discount_value: self.discount_value,
            start_date: self.start_date,
            end_date: self.end_date,
            max_uses: self.max_uses,
            used_count: self.used_count,
            min_cart_value: self.min_cart_value,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Option<Uuid>,
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub instructor_amount: BigDecimal,
    pub currency: String,
    pub payment_method: String,
    pub status: String,
    #[sqlx(rename = "type")]
    pub tx_type: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub promo_code_id: Option<Uuid>,
    pub discount_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRow {
    pub fn into_domain(self) -> RepositoryResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            course_id: self.course_id,
            transaction_id: self.transaction_id,
            amount: self.amount,
            instructor_amount: self.instructor_amount,
            currency: self.currency,
            payment_method: self.payment_method,
            status: parse_column(&self.status)?,
            tx_type: parse_column(&self.tx_type)?,
            paid_at: self.paid_at,
            promo_code_id: self.promo_code_id,
            discount_amount: self.discount_amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct EnrollmentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
}

impl From<EnrollmentRow> for Enrollment {
    fn from(row: EnrollmentRow) -> Self {
        Enrollment {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            enrolled_at: row.enrolled_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CheckoutRow {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub promo_code_id: Option<Uuid>,
    pub subtotal: BigDecimal,
    pub discount_amount: BigDecimal,
    pub tax_amount: BigDecimal,
    pub total: BigDecimal,
    pub instructor_amount: BigDecimal,
    pub currency: String,
    pub state: String,
    pub payment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutRow {
    pub fn into_domain(self) -> RepositoryResult<Checkout> {
        Ok(Checkout {
            id: self.id,
            order_id: self.order_id,
            user_id: self.user_id,
            course_id: self.course_id,
            promo_code_id: self.promo_code_id,
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            tax_amount: self.tax_amount,
            total: self.total,
            instructor_amount: self.instructor_amount,
            currency: self.currency,
            state: parse_column(&self.state)?,
            payment_url: self.payment_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct WithdrawalRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub payment_method_id: Uuid,
    pub status: String,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRow {
    pub fn into_domain(self) -> RepositoryResult<WithdrawalRequest> {
        Ok(WithdrawalRequest {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            payment_method_id: self.payment_method_id,
            status: parse_column(&self.status)?,
            processed_by: self.processed_by,
            processed_at: self.processed_at,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Converts a batch of rows, failing on the first corrupt one.
pub fn collect_domain<R, T>(
    rows: Vec<R>,
    convert: impl Fn(R) -> RepositoryResult<T>,
) -> RepositoryResult<Vec<T>> {
    rows.into_iter().map(convert).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TransactionStatus, TransactionType};

    fn row(status: &str, tx_type: &str) -> TransactionRow {
        TransactionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            course_id: None,
            transaction_id: "ORDER-1".to_string(),
            amount: BigDecimal::from(10),
            instructor_amount: BigDecimal::from(7),
            currency: "USD".to_string(),
            payment_method: "card".to_string(),
            status: status.to_string(),
            tx_type: tx_type.to_string(),
            paid_at: None,
            promo_code_id: None,
            discount_amount: BigDecimal::from(0),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn transaction_row_parses_enum_columns() {
        let tx = row("refunded", "refund").into_domain().unwrap();
        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.tx_type, TransactionType::Refund);
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let err = row("chargeback", "purchase").into_domain().unwrap_err();
        assert!(matches!(err, RepositoryError::Corrupt(_)));
    }
}
