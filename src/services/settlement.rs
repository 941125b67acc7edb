//! Checkout orchestration: promo evaluation, totals, payment hand-off and the
//! settlement performed when the provider confirms payment.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::audit::{ENTITY_CHECKOUT, ENTITY_ENROLLMENT, ENTITY_TRANSACTION};
use crate::domain::pricing::{self, CheckoutTotals};
use crate::domain::promo::{self, normalize_code};
use crate::domain::transaction::NewPurchase;
use crate::domain::{
    AuditEntry, Checkout, CheckoutState, Enrollment, PaymentOutcome, PromoDiscount, Transaction,
};
use crate::error::AppError;
use crate::payments::{PaymentProvider, PaymentRequest};
use crate::ports::{Store, UnitOfWork};

use super::{audit_value, PricingSettings};

pub const FREE_PAYMENT_METHOD: &str = "free";
pub const DEFAULT_PAYMENT_METHOD: &str = "online";
const PROVIDER_ACTOR: &str = "payment_provider";

/// Result of starting a checkout.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// The buyer must complete payment at `checkout.payment_url`.
    PaymentRequired {
        checkout: Checkout,
        promo: Option<PromoDiscount>,
    },
    /// Nothing to pay; the buyer is enrolled already.
    Enrolled {
        enrollment: Enrollment,
        totals: CheckoutTotals,
        promo: Option<PromoDiscount>,
        transaction: Option<Transaction>,
    },
}

/// What a provider callback did to its checkout.
#[derive(Debug, Clone)]
pub enum CallbackResult {
    Settled {
        checkout: Checkout,
        transaction: Transaction,
    },
    AlreadySettled(Checkout),
    Failed(Checkout),
    Pending(Checkout),
}

impl CallbackResult {
    pub fn checkout(&self) -> &Checkout {
        match self {
            CallbackResult::Settled { checkout, .. }
            | CallbackResult::AlreadySettled(checkout)
            | CallbackResult::Failed(checkout)
            | CallbackResult::Pending(checkout) => checkout,
        }
    }
}

pub struct SettlementService {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    pricing: PricingSettings,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        pricing: PricingSettings,
    ) -> Self {
        Self {
            store,
            provider,
            pricing,
        }
    }

    /// Evaluates `code` against the course price without consuming a use.
    pub async fn validate_promo(
        &self,
        code: &str,
        course_id: Uuid,
    ) -> Result<PromoDiscount, AppError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(AppError::Validation("code: must not be empty".to_string()));
        }

        let mut uow = self.store.begin().await?;
        let course = uow
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("course {}", course_id)))?;
        let found = uow.find_promo_code(&code).await?;

        let discount = promo::evaluate(found.as_ref(), &course.price, Utc::now()).map_err(|reason| {
            tracing::info!(code = %code, reason = reason.code(), "promo code rejected");
            reason
        })?;

        Ok(discount)
    }

    pub async fn initiate_checkout(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        promo_code: Option<&str>,
    ) -> Result<CheckoutOutcome, AppError> {
        let promo_code = promo_code.map(normalize_code).filter(|c| !c.is_empty());
        let now = Utc::now();
        let actor = user_id.to_string();

        let mut uow = self.store.begin().await?;

        let course = uow
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("course {}", course_id)))?;
        if !course.is_published {
            return Err(AppError::PreconditionFailed(format!(
                "course {} is not available for purchase",
                course_id
            )));
        }
        if uow.is_enrolled(user_id, course_id).await? {
            return Err(AppError::PreconditionFailed(
                "user is already enrolled in this course".to_string(),
            ));
        }

        let zero = BigDecimal::from(0);
        if course.price <= zero {
            let enrollment = uow
                .insert_enrollment(&Enrollment::new(user_id, course_id, now))
                .await?;
            uow.record_audit(&AuditEntry::created(
                enrollment.id,
                ENTITY_ENROLLMENT,
                audit_value(&enrollment),
                actor.as_str(),
            ))
            .await?;
            uow.commit().await?;

            tracing::info!(
                user_id = %user_id,
                course_id = %course_id,
                "free course enrollment created"
            );
            return Ok(CheckoutOutcome::Enrolled {
                enrollment,
                totals: pricing::calculate(&zero, &zero, &self.pricing.tax_rate_percent),
                promo: None,
                transaction: None,
            });
        }

        let discount = match &promo_code {
            Some(code) => {
                let found = uow.find_promo_code(code).await?;
                Some(promo::evaluate(found.as_ref(), &course.price, now)?)
            }
            None => None,
        };

        let discount_amount = discount
            .as_ref()
            .map(|d| d.discount_amount.clone())
            .unwrap_or_else(|| zero.clone());
        let totals = pricing::calculate(
            &course.price,
            &discount_amount,
            &self.pricing.tax_rate_percent,
        );
        let instructor_amount =
            pricing::instructor_share(&totals.taxable(), &self.pricing.instructor_share_percent);

        let checkout = Checkout::new(
            user_id,
            course_id,
            discount.as_ref().map(|d| d.promo_code_id),
            &totals,
            instructor_amount,
            &self.pricing.currency,
        );
        let checkout = uow.insert_checkout(&checkout).await?;
        uow.record_audit(&AuditEntry::created(
            checkout.id,
            ENTITY_CHECKOUT,
            audit_value(&checkout),
            actor.as_str(),
        ))
        .await?;

        if totals.is_free() {
            let (transaction, enrollment) =
                settle(uow.as_mut(), &checkout, FREE_PAYMENT_METHOD, actor.as_str(), now).await?;
            uow.commit().await?;

            tracing::info!(
                order_id = %checkout.order_id,
                user_id = %user_id,
                "checkout fully discounted, settled without payment"
            );
            return Ok(CheckoutOutcome::Enrolled {
                enrollment,
                totals,
                promo: discount,
                transaction: Some(transaction),
            });
        }

        // The checkout must be visible before the provider can call back.
        uow.commit().await?;

        let request = PaymentRequest {
            order_id: checkout.order_id.clone(),
            amount: checkout.total.clone(),
            currency: checkout.currency.clone(),
            customer_id: user_id,
            item_name: course.title.clone(),
        };

        match self.provider.create_payment(&request).await {
            Ok(session) => {
                let mut uow = self.store.begin().await?;
                let checkout = uow
                    .set_payment_url(checkout.id, &session.redirect_url)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("order {}", checkout.order_id)))?;
                uow.commit().await?;

                tracing::info!(
                    order_id = %checkout.order_id,
                    total = %checkout.total,
                    state = %checkout.state,
                    "payment created"
                );
                Ok(CheckoutOutcome::PaymentRequired {
                    checkout,
                    promo: discount,
                })
            }
            Err(e) => {
                tracing::error!(
                    order_id = %checkout.order_id,
                    error = %e,
                    "payment provider call failed"
                );
                let mut uow = self.store.begin().await?;
                let failed = uow
                    .transition_checkout(
                        checkout.id,
                        CheckoutState::PaymentPending,
                        CheckoutState::Failed,
                    )
                    .await?;
                uow.commit().await?;
                if !failed {
                    tracing::warn!(
                        order_id = %checkout.order_id,
                        "checkout already resolved by a callback, state left as is"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Applies a verified provider notification to its checkout.
    pub async fn handle_payment_callback(
        &self,
        order_id: &str,
        outcome: PaymentOutcome,
        payment_method: Option<&str>,
    ) -> Result<CallbackResult, AppError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let checkout = uow
            .lock_checkout_by_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {}", order_id)))?;

        match (outcome, checkout.state) {
            (PaymentOutcome::Pending, _) => {
                tracing::debug!(order_id = %order_id, "payment still pending");
                Ok(CallbackResult::Pending(checkout))
            }
            (PaymentOutcome::Completed, CheckoutState::Completed) => {
                tracing::info!(order_id = %order_id, "duplicate completion callback ignored");
                Ok(CallbackResult::AlreadySettled(checkout))
            }
            (PaymentOutcome::Completed, CheckoutState::Failed) => {
                tracing::warn!(
                    order_id = %order_id,
                    "completion reported for a failed checkout, manual reconciliation required"
                );
                Err(AppError::PreconditionFailed(format!(
                    "order {} has already failed",
                    order_id
                )))
            }
            (PaymentOutcome::Completed, CheckoutState::PaymentPending) => {
                let method = payment_method
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .unwrap_or(DEFAULT_PAYMENT_METHOD);

                let (transaction, _) = settle(uow.as_mut(), &checkout, method, PROVIDER_ACTOR, now)
                    .await
                    .map_err(|e| {
                        tracing::error!(order_id = %order_id, error = %e, "settlement rolled back");
                        e
                    })?;
                uow.commit().await?;

                tracing::info!(
                    order_id = %order_id,
                    transaction_id = %transaction.id,
                    amount = %transaction.amount,
                    "checkout settled"
                );
                let mut checkout = checkout;
                checkout.state = CheckoutState::Completed;
                checkout.updated_at = now;
                Ok(CallbackResult::Settled {
                    checkout,
                    transaction,
                })
            }
            (PaymentOutcome::Failed, CheckoutState::PaymentPending) => {
                uow.transition_checkout(
                    checkout.id,
                    CheckoutState::PaymentPending,
                    CheckoutState::Failed,
                )
                .await?;
                let mut failed = checkout.clone();
                failed.state = CheckoutState::Failed;
                failed.updated_at = now;
                uow.record_audit(&AuditEntry::updated(
                    checkout.id,
                    ENTITY_CHECKOUT,
                    audit_value(&checkout),
                    audit_value(&failed),
                    PROVIDER_ACTOR,
                ))
                .await?;
                uow.commit().await?;

                tracing::info!(order_id = %order_id, "payment failed");
                Ok(CallbackResult::Failed(failed))
            }
            (PaymentOutcome::Failed, state) => {
                tracing::warn!(order_id = %order_id, state = %state, "failure callback ignored");
                Ok(CallbackResult::Failed(checkout))
            }
        }
    }
}

/// Records the purchase, consumes the promo use, enrolls the buyer and
/// completes the checkout, all inside the caller's unit of work.
async fn settle(
    uow: &mut dyn UnitOfWork,
    checkout: &Checkout,
    payment_method: &str,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<(Transaction, Enrollment), AppError> {
    let purchase = Transaction::purchase(
        NewPurchase {
            user_id: checkout.user_id,
            course_id: checkout.course_id,
            transaction_id: checkout.order_id.clone(),
            amount: checkout.total.clone(),
            instructor_amount: checkout.instructor_amount.clone(),
            currency: checkout.currency.clone(),
            payment_method: payment_method.to_string(),
            promo_code_id: checkout.promo_code_id,
            discount_amount: checkout.discount_amount.clone(),
        },
        now,
    );
    let transaction = uow.insert_transaction(&purchase).await?;

    if let Some(promo_code_id) = checkout.promo_code_id {
        if !uow.redeem_promo_code(promo_code_id).await? {
            return Err(AppError::Conflict(format!(
                "promo code {} has reached its usage limit",
                promo_code_id
            )));
        }
    }

    let enrollment = uow
        .insert_enrollment(&Enrollment::new(checkout.user_id, checkout.course_id, now))
        .await?;
    let completed_now = uow
        .transition_checkout(checkout.id, CheckoutState::PaymentPending, CheckoutState::Completed)
        .await?;
    if !completed_now {
        return Err(AppError::Conflict(format!(
            "order {} is no longer awaiting payment",
            checkout.order_id
        )));
    }

    let mut completed = checkout.clone();
    completed.state = CheckoutState::Completed;
    completed.updated_at = now;

    uow.record_audit(&AuditEntry::created(
        transaction.id,
        ENTITY_TRANSACTION,
        audit_value(&transaction),
        actor,
    ))
    .await?;
    uow.record_audit(&AuditEntry::created(
        enrollment.id,
        ENTITY_ENROLLMENT,
        audit_value(&enrollment),
        actor,
    ))
    .await?;
    uow.record_audit(&AuditEntry::updated(
        checkout.id,
        ENTITY_CHECKOUT,
        audit_value(checkout),
        audit_value(&completed),
        actor,
    ))
    .await?;

    Ok((transaction, enrollment))
}
