use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel_async::AsyncConnection;
use serde::Serialize;
use serde_json::{json, Value};
use shared::payment::transaction_reference;
use shared::{GatewayEnvelope, InitializeRequest, PaymentStatus};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::gateway::GatewayClient;
use crate::lifecycle::{confirm_from_payment, payment_confirmation};
use crate::models::*;
use crate::outbox;
use crate::repository::{bookings, payments, users};
use crate::DbPool;

#[derive(Debug, Serialize)]
pub struct InitiatedPayment {
    pub checkout_url: String,
    pub payment_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct VerifiedPayment {
    pub payment_status: PaymentStatus,
    pub response: Value,
}

/// Storage used by [`PaymentService`]. Each call stands alone, so no
/// connection is held while the gateway is being called.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn booking(&self, booking_id: Uuid) -> AppResult<(Booking, Listing)>;
    async fn user(&self, user_id: Uuid) -> AppResult<User>;
    async fn open(&self, payment: NewPayment) -> AppResult<Payment>;
    async fn latest_for_booking(&self, booking_id: Uuid) -> AppResult<Option<Payment>>;
    async fn record_initialization(
        &self,
        payment_id: Uuid,
        transaction_id: &str,
        response: &Value,
    ) -> AppResult<()>;
    async fn record_outcome(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        response: &Value,
    ) -> AppResult<()>;
    /// Completes the payment, confirms its booking and queues the payment
    /// confirmation, all in one transaction.
    async fn settle(&self, payment_id: Uuid, booking_id: Uuid, response: &Value)
        -> AppResult<Booking>;
}

pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn booking(&self, booking_id: Uuid) -> AppResult<(Booking, Listing)> {
        let mut conn = self.pool.get().await?;
        bookings::find_with_listing(&mut conn, booking_id).await
    }

    async fn user(&self, user_id: Uuid) -> AppResult<User> {
        let mut conn = self.pool.get().await?;
        users::find(&mut conn, user_id).await
    }

    async fn open(&self, payment: NewPayment) -> AppResult<Payment> {
        let mut conn = self.pool.get().await?;
        payments::insert(&mut conn, &payment).await
    }

    async fn latest_for_booking(&self, booking_id: Uuid) -> AppResult<Option<Payment>> {
        let mut conn = self.pool.get().await?;
        payments::latest_for_booking(&mut conn, booking_id).await
    }

    async fn record_initialization(
        &self,
        payment_id: Uuid,
        transaction_id: &str,
        response: &Value,
    ) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        payments::record_initialization(&mut conn, payment_id, Some(transaction_id), response).await
    }

    async fn record_outcome(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        response: &Value,
    ) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        payments::record_outcome(&mut conn, payment_id, status, response).await?;
        Ok(())
    }

    async fn settle(
        &self,
        payment_id: Uuid,
        booking_id: Uuid,
        response: &Value,
    ) -> AppResult<Booking> {
        let response = response.clone();
        let mut conn = self.pool.get().await?;
        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                payments::record_outcome(conn, payment_id, PaymentStatus::Completed, &response)
                    .await?;
                let booking = confirm_from_payment(conn, booking_id).await?;
                if let Some(command) = payment_confirmation(&booking)? {
                    outbox::schedule(conn, command).await;
                }
                Ok(booking)
            })
        })
        .await
    }
}

/// Runs the initiate/verify round trip against the remote gateway and keeps
/// the local payment and booking rows in step with it.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    gateway: GatewayClient,
    site_url: String,
}

impl PaymentService {
    pub fn new(store: Arc<dyn PaymentStore>, gateway: GatewayClient, site_url: String) -> Self {
        Self {
            store,
            gateway,
            site_url,
        }
    }

    fn verify_url(&self, booking_id: Uuid) -> String {
        format!(
            "{}/api/bookings/{}/verify_payment",
            self.site_url.trim_end_matches('/'),
            booking_id
        )
    }

    pub async fn initiate(&self, actor: Uuid, booking_id: Uuid) -> AppResult<InitiatedPayment> {
        let (booking, listing) = self.store.booking(booking_id).await?;
        booking.parties(&listing).authorize_guest(actor)?;
        let guest = self.store.user(booking.guest_id).await?;

        let payment = self
            .store
            .open(NewPayment {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                amount: booking.total_price.clone(),
                currency: self.gateway.currency().to_string(),
                status: PaymentStatus::Pending.to_string(),
            })
            .await?;

        let tx_ref = transaction_reference(booking.id, Utc::now().timestamp());
        let return_to = self.verify_url(booking.id);
        let request = InitializeRequest {
            amount: payment.amount.to_string(),
            currency: payment.currency.clone(),
            email: guest.email,
            first_name: guest.first_name,
            last_name: guest.last_name,
            tx_ref: tx_ref.clone(),
            callback_url: return_to.clone(),
            return_url: return_to,
        };

        let raw = match self.gateway.initialize(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(payment_id = %payment.id, %tx_ref, "Gateway initialization failed: {}", e);
                self.store
                    .record_outcome(
                        payment.id,
                        PaymentStatus::Failed,
                        &json!({ "error": e.to_string() }),
                    )
                    .await?;
                return Err(e.into());
            }
        };

        let envelope = GatewayEnvelope::parse(&raw);
        let transaction_id = envelope.transaction_id().unwrap_or(&tx_ref);
        self.store
            .record_initialization(payment.id, transaction_id, &raw)
            .await?;

        match envelope.checkout_url() {
            Some(url) => {
                info!(payment_id = %payment.id, %transaction_id, "Payment initiated");
                Ok(InitiatedPayment {
                    checkout_url: url.to_string(),
                    payment_id: payment.id,
                })
            }
            None => Err(AppError::GatewayRejected {
                message: "Could not initiate payment".to_string(),
                response: raw,
            }),
        }
    }

    /// `override_tx` is only consulted when the stored payment has no
    /// transaction id of its own.
    pub async fn verify(
        &self,
        actor: Uuid,
        booking_id: Uuid,
        override_tx: Option<String>,
    ) -> AppResult<VerifiedPayment> {
        let (booking, listing) = self.store.booking(booking_id).await?;
        if !booking.parties(&listing).involves(actor) {
            return Err(AppError::not_found("Booking"));
        }

        let payment = self
            .store
            .latest_for_booking(booking.id)
            .await?
            .ok_or_else(|| AppError::NotFound("No payment found for this booking".to_string()))?;

        let tx = payment
            .transaction_id
            .clone()
            .or(override_tx)
            .filter(|tx| !tx.is_empty())
            .ok_or_else(|| {
                AppError::Validation("No transaction id available to verify".to_string())
            })?;

        let raw = self.gateway.verify(&tx).await.map_err(|e| {
            warn!(payment_id = %payment.id, %tx, "Gateway verification failed: {}", e);
            AppError::GatewayUnavailable {
                message: "Verification request failed".to_string(),
                details: e.to_string(),
            }
        })?;

        let status = GatewayEnvelope::parse(&raw).payment_status();
        if status == PaymentStatus::Completed {
            let booking = self.store.settle(payment.id, booking.id, &raw).await?;
            info!(payment_id = %payment.id, booking_id = %booking.id, booking_status = %booking.status, "Payment settled");
        } else {
            self.store.record_outcome(payment.id, status, &raw).await?;
            info!(payment_id = %payment.id, %booking_id, %status, "Payment verified");
        }

        Ok(VerifiedPayment {
            payment_status: status,
            response: raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use httpmock::prelude::*;
    use shared::BookingStatus;

    use crate::gateway::GatewayConfig;

    struct Ledger {
        booking: Booking,
        listing: Listing,
        guest: User,
        payments: Vec<Payment>,
    }

    struct MemoryStore(Mutex<Ledger>);

    impl MemoryStore {
        fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
            self.0.lock().unwrap()
        }

        fn update(&self, payment_id: Uuid, apply: impl FnOnce(&mut Payment)) -> AppResult<()> {
            let mut ledger = self.ledger();
            let payment = ledger
                .payments
                .iter_mut()
                .find(|p| p.id == payment_id)
                .ok_or_else(|| AppError::not_found("Payment"))?;
            apply(payment);
            Ok(())
        }
    }

    #[async_trait]
    impl PaymentStore for MemoryStore {
        async fn booking(&self, booking_id: Uuid) -> AppResult<(Booking, Listing)> {
            let ledger = self.ledger();
            if ledger.booking.id != booking_id {
                return Err(AppError::not_found("Booking"));
            }
            Ok((ledger.booking.clone(), ledger.listing.clone()))
        }

        async fn user(&self, user_id: Uuid) -> AppResult<User> {
            let ledger = self.ledger();
            if ledger.guest.id != user_id {
                return Err(AppError::not_found("User"));
            }
            Ok(ledger.guest.clone())
        }

        async fn open(&self, payment: NewPayment) -> AppResult<Payment> {
            let row = Payment {
                id: payment.id,
                booking_id: payment.booking_id,
                amount: payment.amount,
                currency: payment.currency,
                status: payment.status,
                transaction_id: None,
                gateway_response: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.ledger().payments.push(row.clone());
            Ok(row)
        }

        async fn latest_for_booking(&self, booking_id: Uuid) -> AppResult<Option<Payment>> {
            Ok(self
                .ledger()
                .payments
                .iter()
                .rev()
                .find(|p| p.booking_id == booking_id)
                .cloned())
        }

        async fn record_initialization(
            &self,
            payment_id: Uuid,
            transaction_id: &str,
            response: &Value,
        ) -> AppResult<()> {
            self.update(payment_id, |p| {
                p.transaction_id = Some(transaction_id.to_string());
                p.gateway_response = Some(response.clone());
            })
        }

        async fn record_outcome(
            &self,
            payment_id: Uuid,
            status: PaymentStatus,
            response: &Value,
        ) -> AppResult<()> {
            self.update(payment_id, |p| {
                p.status = status.to_string();
                p.gateway_response = Some(response.clone());
            })
        }

        async fn settle(
            &self,
            payment_id: Uuid,
            booking_id: Uuid,
            response: &Value,
        ) -> AppResult<Booking> {
            self.record_outcome(payment_id, PaymentStatus::Completed, response)
                .await?;
            let mut ledger = self.ledger();
            assert_eq!(ledger.booking.id, booking_id);
            if let Some(next) = ledger.booking.status()?.confirm_by_payment() {
                ledger.booking.status = next.to_string();
            }
            Ok(ledger.booking.clone())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        service: PaymentService,
        booking_id: Uuid,
        guest_id: Uuid,
        owner_id: Uuid,
    }

    fn fixture(gateway_url: String) -> Fixture {
        let guest_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        let listing_id = Uuid::new_v4();
        let booking_id = Uuid::new_v4();
        let now = Utc::now();

        let listing = Listing {
            id: listing_id,
            title: "Lakeside cabin".to_string(),
            description: String::new(),
            property_type: "cabin".to_string(),
            location: "12 Shore Rd".to_string(),
            city: "Bahir Dar".to_string(),
            country: "Ethiopia".to_string(),
            latitude: None,
            longitude: None,
            bedrooms: 2,
            bathrooms: 1,
            max_guests: 4,
            price_per_night: BigDecimal::from(80),
            available_from: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            available_to: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            amenities: vec![],
            owner_id,
            image_url: None,
            rating: 0.0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let booking = Booking {
            id: booking_id,
            listing_id,
            guest_id,
            check_in: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
            number_of_guests: 2,
            total_price: BigDecimal::from(320),
            status: BookingStatus::Pending.to_string(),
            special_requests: None,
            created_at: now,
            updated_at: now,
        };
        let guest = User {
            id: guest_id,
            username: "abebe_k".to_string(),
            email: "abebe@example.com".to_string(),
            first_name: "Abebe".to_string(),
            last_name: "Kebede".to_string(),
            created_at: now,
        };

        let store = Arc::new(MemoryStore(Mutex::new(Ledger {
            booking,
            listing,
            guest,
            payments: vec![],
        })));
        let gateway = GatewayClient::new(GatewayConfig {
            base_url: gateway_url,
            secret_key: "sk_test".to_string(),
            currency: "USD".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        Fixture {
            service: PaymentService::new(store.clone(), gateway, "http://localhost:3001/".to_string()),
            store,
            booking_id,
            guest_id,
            owner_id,
        }
    }

    impl Fixture {
        fn payments(&self) -> Vec<Payment> {
            self.store.ledger().payments.clone()
        }

        fn booking_status(&self) -> String {
            self.store.ledger().booking.status.clone()
        }

        fn with_payment(&self, transaction_id: Option<&str>) -> Uuid {
            let now = Utc::now();
            let id = Uuid::new_v4();
            self.store.ledger().payments.push(Payment {
                id,
                booking_id: self.booking_id,
                amount: BigDecimal::from(320),
                currency: "USD".to_string(),
                status: PaymentStatus::Pending.to_string(),
                transaction_id: transaction_id.map(str::to_string),
                gateway_response: None,
                created_at: now,
                updated_at: now,
            });
            id
        }
    }

    #[tokio::test]
    async fn initiate_returns_checkout_url_and_stores_transaction() {
        let server = MockServer::start();
        let f = fixture(server.base_url());
        let callback = format!("http://localhost:3001/api/bookings/{}/verify_payment", f.booking_id);
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/transaction/initialize")
                .json_body_partial(
                    json!({
                        "amount": "320",
                        "email": "abebe@example.com",
                        "callback_url": callback,
                        "return_url": callback
                    })
                    .to_string(),
                );
            then.status(200).json_body(json!({
                "status": "success",
                "data": { "checkout_url": "https://checkout.example/abc", "reference": "ref-1" }
            }));
        });

        let initiated = f.service.initiate(f.guest_id, f.booking_id).await.unwrap();

        mock.assert();
        assert_eq!(initiated.checkout_url, "https://checkout.example/abc");
        let payments = f.payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].id, initiated.payment_id);
        assert_eq!(payments[0].status, "pending");
        assert_eq!(payments[0].amount, BigDecimal::from(320));
        assert_eq!(payments[0].transaction_id.as_deref(), Some("ref-1"));
    }

    #[tokio::test]
    async fn initiate_by_someone_else_creates_nothing() {
        let server = MockServer::start();
        let f = fixture(server.base_url());
        let mock = server.mock(|when, then| {
            when.path("/transaction/initialize");
            then.status(200);
        });

        let err = f.service.initiate(f.owner_id, f.booking_id).await.unwrap_err();

        assert!(matches!(err, AppError::Domain(ref e) if e.is_permission()));
        assert!(f.payments().is_empty());
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn unreachable_gateway_marks_payment_failed() {
        let f = fixture("http://127.0.0.1:9".to_string());

        let err = f.service.initiate(f.guest_id, f.booking_id).await.unwrap_err();

        assert!(matches!(err, AppError::GatewayUnavailable { .. }));
        let payments = f.payments();
        assert_eq!(payments[0].status, "failed");
        let response = payments[0].gateway_response.clone().unwrap();
        assert!(response["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn missing_checkout_url_returns_raw_response() {
        let server = MockServer::start();
        let f = fixture(server.base_url());
        let reply = json!({ "status": "failed", "message": "Invalid currency" });
        let body = reply.clone();
        server.mock(move |when, then| {
            when.method(POST).path("/transaction/initialize");
            then.status(400).json_body(body);
        });

        let err = f.service.initiate(f.guest_id, f.booking_id).await.unwrap_err();

        match err {
            AppError::GatewayRejected { message, response } => {
                assert_eq!(message, "Could not initiate payment");
                assert_eq!(response, reply);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn declined_verification_fails_payment_and_leaves_booking() {
        let server = MockServer::start();
        let f = fixture(server.base_url());
        let payment_id = f.with_payment(Some("tx-9"));
        server.mock(|when, then| {
            when.method(GET).path("/transaction/verify/tx-9");
            then.status(200).json_body(json!({ "status": "declined" }));
        });

        let verified = f.service.verify(f.owner_id, f.booking_id, None).await.unwrap();

        assert_eq!(verified.payment_status, PaymentStatus::Failed);
        let payments = f.payments();
        assert_eq!(payments[0].id, payment_id);
        assert_eq!(payments[0].status, "failed");
        assert_eq!(f.booking_status(), "pending");
    }

    #[tokio::test]
    async fn successful_verification_confirms_booking() {
        let server = MockServer::start();
        let f = fixture(server.base_url());
        f.with_payment(Some("tx-9"));
        let mock = server.mock(|when, then| {
            when.method(GET).path("/transaction/verify/tx-9");
            then.status(200)
                .json_body(json!({ "status": "success", "data": { "status": "success" } }));
        });

        let verified = f
            .service
            .verify(f.guest_id, f.booking_id, Some("ignored".to_string()))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(verified.payment_status, PaymentStatus::Completed);
        assert_eq!(f.payments()[0].status, "completed");
        assert_eq!(f.booking_status(), "confirmed");
    }

    #[tokio::test]
    async fn verification_falls_back_to_supplied_transaction_id() {
        let server = MockServer::start();
        let f = fixture(server.base_url());
        f.with_payment(None);
        let mock = server.mock(|when, then| {
            when.method(GET).path("/transaction/verify/from-query");
            then.status(200).json_body(json!({ "status": "paid" }));
        });

        f.service
            .verify(f.guest_id, f.booking_id, Some("from-query".to_string()))
            .await
            .unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn verification_is_limited_to_the_parties() {
        let f = fixture("http://127.0.0.1:9".to_string());
        f.with_payment(Some("tx-9"));

        let err = f
            .service
            .verify(Uuid::new_v4(), f.booking_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn verification_without_payment_is_not_found() {
        let f = fixture("http://127.0.0.1:9".to_string());

        let err = f.service.verify(f.guest_id, f.booking_id, None).await.unwrap_err();
        assert!(
            matches!(err, AppError::NotFound(ref m) if m == "No payment found for this booking")
        );
    }
}
