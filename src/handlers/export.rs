use axum::{
    body::StreamBody,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use csv::WriterBuilder;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::io;
use std::pin::Pin;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::db::queries::{self, TransactionFilter};
use crate::domain::Transaction;
use crate::error::AppError;
use crate::AppState;

use super::transactions::TransactionQuery;

/// Rows fetched per round trip while streaming.
const BATCH_SIZE: i64 = 1000;

pub const CSV_HEADER: &str = concat!(
    "id,transaction_id,user_id,course_id,type,status,amount,instructor_amount,",
    "discount_amount,currency,payment_method,paid_at,created_at"
);

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// `csv` (default) or `json` for JSON Lines
    pub format: Option<String>,
    pub user_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    /// Inclusive start date, `YYYY-MM-DD`
    pub from: Option<String>,
    /// Inclusive end date, `YYYY-MM-DD`
    pub to: Option<String>,
}

impl ExportQuery {
    fn filter(&self) -> Result<TransactionFilter, AppError> {
        TransactionQuery {
            user_id: self.user_id,
            course_id: self.course_id,
            status: self.status.clone(),
            tx_type: self.tx_type.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            ..Default::default()
        }
        .filter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Csv,
    JsonLines,
}

impl ExportFormat {
    fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(|f| f.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("csv") => Ok(ExportFormat::Csv),
            Some("json") | Some("jsonl") => Ok(ExportFormat::JsonLines),
            Some(other) => Err(AppError::Validation(format!(
                "format: unsupported export format {}",
                other
            ))),
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::JsonLines => "application/x-ndjson",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::JsonLines => "jsonl",
        }
    }
}

/// One exported ledger row. Field order matches `CSV_HEADER`.
#[derive(Debug, Serialize)]
struct ExportRow {
    id: String,
    transaction_id: String,
    user_id: String,
    course_id: String,
    #[serde(rename = "type")]
    tx_type: String,
    status: String,
    amount: String,
    instructor_amount: String,
    discount_amount: String,
    currency: String,
    payment_method: String,
    paid_at: String,
    created_at: String,
}

impl From<&Transaction> for ExportRow {
    fn from(tx: &Transaction) -> Self {
        ExportRow {
            id: tx.id.to_string(),
            transaction_id: tx.transaction_id.clone(),
            user_id: tx.user_id.to_string(),
            course_id: tx.course_id.map(|id| id.to_string()).unwrap_or_default(),
            tx_type: tx.tx_type.to_string(),
            status: tx.status.to_string(),
            amount: tx.amount.to_string(),
            instructor_amount: tx.instructor_amount.to_string(),
            discount_amount: tx.discount_amount.to_string(),
            currency: tx.currency.clone(),
            payment_method: tx.payment_method.clone(),
            paid_at: tx.paid_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

fn csv_line(tx: &Transaction) -> io::Result<String> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(vec![]);
    wtr.serialize(ExportRow::from(tx))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn json_line(tx: &Transaction) -> io::Result<String> {
    let mut line = serde_json::to_string(&ExportRow::from(tx))?;
    line.push('\n');
    Ok(line)
}

type ExportStream = Pin<Box<dyn Stream<Item = io::Result<String>> + Send>>;

/// Walks the filtered ledger in id order, one batch at a time, so memory stays
/// flat no matter how many rows match.
fn export_stream(state: AppState, filter: TransactionFilter, format: ExportFormat) -> ExportStream {
    Box::pin(async_stream::stream! {
        if format == ExportFormat::Csv {
            yield Ok(format!("{}\n", CSV_HEADER));
        }

        let mut last_id: Option<Uuid> = None;
        loop {
            let fetched = queries::transaction_batch(&state.db, &filter, last_id, BATCH_SIZE).await;
            let batch = match fetched {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(error = %e, "transaction export aborted");
                    yield Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
                    return;
                }
            };

            let done = (batch.len() as i64) < BATCH_SIZE;
            for tx in &batch {
                last_id = Some(tx.id);
                yield match format {
                    ExportFormat::Csv => csv_line(tx),
                    ExportFormat::JsonLines => json_line(tx),
                };
            }

            if done {
                break;
            }
        }
    })
}

#[utoipa::path(
    get,
    path = "/admin/transactions/export",
    params(ExportQuery),
    responses(
        (
            status = 200,
            description = "Streamed CSV or JSON Lines export",
            content_type = "text/csv"
        ),
        (status = 400, description = "Invalid filter"),
        (status = 401, description = "Missing or invalid admin API key")
    ),
    security(("adminKey" = [])),
    tag = "Transactions"
)]
pub async fn export_transactions(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let format = ExportFormat::parse(query.format.as_deref())?;
    let filter = query.filter()?;

    let filename = format!(
        "transactions_{}.{}",
        Utc::now().format("%Y-%m-%d"),
        format.extension()
    );
    tracing::info!(filename = %filename, "starting transaction export");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|e| AppError::Internal(e.to_string()))?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    let body = StreamBody::new(export_stream(state, filter, format));
    Ok((StatusCode::OK, headers, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::NewPurchase;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn purchase() -> Transaction {
        Transaction::purchase(
            NewPurchase {
                user_id: Uuid::new_v4(),
                course_id: Uuid::new_v4(),
                transaction_id: "ORDER-1".to_string(),
                amount: BigDecimal::from_str("99.90").unwrap(),
                instructor_amount: BigDecimal::from_str("69.93").unwrap(),
                currency: "USD".to_string(),
                payment_method: "credit_card, visa".to_string(),
                promo_code_id: None,
                discount_amount: BigDecimal::from(0),
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_default_format() {
        assert_eq!(ExportFormat::parse(None).unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse(Some("JSON")).unwrap(), ExportFormat::JsonLines);
        assert!(ExportFormat::parse(Some("xml")).is_err());
    }

    #[test]
    fn csv_line_matches_header_columns() {
        let tx = purchase();
        let line = csv_line(&tx).unwrap();

        assert!(line.ends_with('\n'));
        assert!(line.starts_with(&tx.id.to_string()));
        assert!(line.contains(",ORDER-1,"));
        assert!(line.contains(",99.90,69.93,"));
        // the comma inside payment_method is quoted
        assert!(line.contains("\"credit_card, visa\""));

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(line.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.len(), CSV_HEADER.split(',').count());
    }

    #[test]
    fn json_line_uses_type_key() {
        let tx = purchase();
        let line = json_line(&tx).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();

        assert_eq!(value["type"], "purchase");
        assert_eq!(value["amount"], "99.90");
        assert_eq!(value["paid_at"], tx.created_at.to_rfc3339());
    }

    #[test]
    fn export_query_reuses_transaction_filter() {
        let query = ExportQuery {
            status: Some("completed".to_string()),
            to: Some("2025-01-31".to_string()),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert!(filter.status.is_some());
        assert!(filter.to.is_some());

        let bad = ExportQuery {
            tx_type: Some("gift".to_string()),
            ..Default::default()
        };
        assert!(bad.filter().is_err());
    }
}
