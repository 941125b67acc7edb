use axum::Json;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::admin::{
    __path_approve_withdrawal, __path_create_promo_code, __path_delete_promo_code,
    __path_get_audit_logs, __path_get_promo_code, __path_get_transaction, __path_list_promo_codes,
    __path_list_withdrawals, __path_process_withdrawal, __path_refund_transaction,
    __path_reject_withdrawal, __path_toggle_promo_code, ApprovalResponse, AuditLogView,
    CreatePromoCodeRequest, PromoCodeView, RefundResponse, ReviewRequest,
};
use super::checkout::{CheckoutRequest, CheckoutResponse, __path_create_checkout};
use super::export::__path_export_transactions;
use super::promo::{PromoPreview, ValidatePromoRequest, __path_validate_promo_code};
use super::transactions::{
    TransactionPage, TransactionView, __path_list_my_transactions, __path_list_transactions,
};
use super::webhook::{CallbackAck, PaymentCallback, __path_payment_callback};
use super::withdrawals::{CreateWithdrawalRequest, WithdrawalView, __path_request_withdrawal};
use super::{DbPoolStats, HealthStatus, __path_health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health, validate_promo_code, create_checkout, payment_callback,
        list_my_transactions, request_withdrawal,
        list_transactions, get_transaction, export_transactions, refund_transaction,
        list_promo_codes, get_promo_code, create_promo_code, toggle_promo_code, delete_promo_code,
        list_withdrawals, approve_withdrawal, reject_withdrawal, process_withdrawal,
        get_audit_logs
    ),
    components(schemas(
        HealthStatus, DbPoolStats,
        ValidatePromoRequest, PromoPreview,
        CheckoutRequest, CheckoutResponse,
        PaymentCallback, CallbackAck,
        TransactionView, TransactionPage, RefundResponse,
        CreatePromoCodeRequest, PromoCodeView,
        CreateWithdrawalRequest, WithdrawalView, ReviewRequest, ApprovalResponse,
        AuditLogView
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and database status"),
        (name = "Checkout", description = "Course purchase flow"),
        (name = "Promo Codes", description = "Promo code validation and administration"),
        (name = "Webhooks", description = "Payment provider notifications"),
        (name = "Transactions", description = "Ledger queries, export and refunds"),
        (name = "Withdrawals", description = "Instructor payouts"),
        (name = "Audit", description = "Audit trail")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "adminKey",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
            components.add_security_scheme(
                "userId",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-User-Id"))),
            );
        }
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
