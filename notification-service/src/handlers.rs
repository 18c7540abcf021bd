use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Message, Offset, TopicPartitionList};
use shared::NotificationCommand;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::models::*;
use crate::offsets::OffsetTracker;
use crate::schema::*;
use crate::DbPool;

/// Idempotency record of notifications that reached a final outcome.
#[async_trait]
pub trait ProcessedLog: Send + Sync {
    async fn find(&self, idempotency_key: &str) -> Result<Option<ProcessedNotification>>;
    async fn record(&self, processed: &ProcessedNotification) -> Result<()>;
}

/// Where commands go once every delivery attempt has failed.
#[async_trait]
pub trait DeadLetters: Send + Sync {
    async fn publish(&self, command: &NotificationCommand) -> Result<()>;
}

pub struct PgProcessedLog {
    pool: DbPool,
}

impl PgProcessedLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedLog for PgProcessedLog {
    async fn find(&self, idempotency_key: &str) -> Result<Option<ProcessedNotification>> {
        let mut conn = self.pool.get().await?;
        let result = processed_notifications::table
            .filter(processed_notifications::idempotency_key.eq(idempotency_key))
            .select(ProcessedNotification::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(result)
    }

    async fn record(&self, processed: &ProcessedNotification) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(processed_notifications::table)
            .values(processed)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

pub struct KafkaDeadLetters {
    producer: FutureProducer,
    topic: String,
}

impl KafkaDeadLetters {
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }
}

#[async_trait]
impl DeadLetters for KafkaDeadLetters {
    async fn publish(&self, command: &NotificationCommand) -> Result<()> {
        let json = serde_json::to_string(command)?;
        let key = command.booking_id.to_string();
        let record = FutureRecord::to(&self.topic).payload(&json).key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish dead letter: {}", e))?;

        Ok(())
    }
}

/// Consumes notification commands with a bounded number of concurrent workers.
pub struct NotificationHandler {
    log: Arc<dyn ProcessedLog>,
    dead_letters: Arc<dyn DeadLetters>,
    dispatcher: Arc<Dispatcher>,
    workers: usize,
}

impl NotificationHandler {
    pub fn new(
        log: Arc<dyn ProcessedLog>,
        dead_letters: Arc<dyn DeadLetters>,
        dispatcher: Arc<Dispatcher>,
        workers: usize,
    ) -> Self {
        Self {
            log,
            dead_letters,
            dispatcher,
            workers: workers.max(1),
        }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let consumer = &consumer;
        let offsets = &Mutex::new(OffsetTracker::default());

        consumer
            .stream()
            .for_each_concurrent(self.workers, |message| {
                if let Ok(m) = &message {
                    tracker(offsets).begin(m.topic(), m.partition(), m.offset());
                }

                async move {
                    let m = match message {
                        Ok(m) => m,
                        Err(e) => {
                            error!("Error receiving message: {}", e);
                            return;
                        }
                    };

                    let settled = match m.payload_view::<str>() {
                        Some(Ok(json_str)) => {
                            match serde_json::from_str::<NotificationCommand>(json_str) {
                                Ok(command) => self.handle_command(command).await,
                                Err(e) => {
                                    error!("Discarding malformed notification command: {}", e);
                                    true
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!("Error parsing payload: {}", e);
                            true
                        }
                        None => {
                            warn!("Received notification message without payload");
                            true
                        }
                    };

                    if !settled {
                        warn!(
                            partition = m.partition(),
                            offset = m.offset(),
                            pending = tracker(offsets).pending(m.topic(), m.partition()),
                            "Leaving offset uncommitted for redelivery"
                        );
                        return;
                    }

                    let position = tracker(offsets).finish(m.topic(), m.partition(), m.offset());
                    if let Some(position) = position {
                        if let Err(e) = commit(consumer, m.topic(), m.partition(), position) {
                            error!("Error committing offset: {}", e);
                        }
                    }
                }
            })
            .await;
    }

    /// `true` once the command reached a final outcome: sent, skipped,
    /// already processed, or dead-lettered.
    async fn handle_command(&self, command: NotificationCommand) -> bool {
        match self.process(&command).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    command_id = %command.id,
                    booking_id = %command.booking_id,
                    kind = %command.kind,
                    "Notification left unsettled: {}",
                    e
                );
                false
            }
        }
    }

    async fn process(&self, command: &NotificationCommand) -> Result<()> {
        if let Some(existing) = self.log.find(&command.idempotency_key).await? {
            info!(
                idempotency_key = %existing.idempotency_key,
                sent = existing.sent,
                "Notification already processed, skipping"
            );
            return Ok(());
        }

        match self.dispatcher.dispatch_with_retry(command).await {
            Ok(delivery) => {
                self.log
                    .record(&ProcessedNotification::new(command, delivery))
                    .await
            }
            Err(e) => {
                error!(
                    booking_id = %command.booking_id,
                    kind = %command.kind,
                    "Notification failed, sending to dead-letter topic: {}",
                    e
                );
                self.dead_letters.publish(command).await
            }
        }
    }
}

fn tracker(offsets: &Mutex<OffsetTracker>) -> MutexGuard<'_, OffsetTracker> {
    offsets.lock().unwrap_or_else(PoisonError::into_inner)
}

fn commit(consumer: &StreamConsumer, topic: &str, partition: i32, position: i64) -> KafkaResult<()> {
    let mut positions = TopicPartitionList::new();
    positions.add_partition_offset(topic, partition, Offset::Offset(position))?;
    consumer.commit(&positions, CommitMode::Async)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use shared::NotificationKind;
    use uuid::Uuid;

    use crate::dispatcher::{BookingContext, BookingDirectory, RetryPolicy};
    use crate::mail::{MailError, MailMessage, MailTransport};
    use crate::templates::{TemplateError, TemplateRenderer, TemplateVars};

    #[derive(Default)]
    struct MemoryLog {
        records: Mutex<Vec<ProcessedNotification>>,
        broken: bool,
    }

    #[async_trait]
    impl ProcessedLog for MemoryLog {
        async fn find(&self, key: &str) -> Result<Option<ProcessedNotification>> {
            let records = self.records.lock().unwrap();
            Ok(records.iter().find(|r| r.idempotency_key == key).cloned())
        }

        async fn record(&self, processed: &ProcessedNotification) -> Result<()> {
            if self.broken {
                anyhow::bail!("database unavailable");
            }
            self.records.lock().unwrap().push(processed.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryDeadLetters {
        published: Mutex<Vec<Uuid>>,
        broken: bool,
    }

    #[async_trait]
    impl DeadLetters for MemoryDeadLetters {
        async fn publish(&self, command: &NotificationCommand) -> Result<()> {
            if self.broken {
                anyhow::bail!("broker unavailable");
            }
            self.published.lock().unwrap().push(command.id);
            Ok(())
        }
    }

    struct OneBooking(BookingContext);

    #[async_trait]
    impl BookingDirectory for OneBooking {
        async fn load(&self, booking_id: Uuid) -> Result<Option<BookingContext>> {
            Ok((booking_id == self.0.booking_id).then(|| self.0.clone()))
        }
    }

    struct TextOnly;

    #[async_trait]
    impl TemplateRenderer for TextOnly {
        async fn render(
            &self,
            kind: NotificationKind,
            _: &TemplateVars,
        ) -> Result<String, TemplateError> {
            Err(TemplateError::Missing(format!("{}.html", kind)))
        }
    }

    struct CountingMail {
        calls: AtomicU32,
        rejecting: bool,
    }

    #[async_trait]
    impl MailTransport for CountingMail {
        async fn send(&self, _: &MailMessage) -> Result<(), MailError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.rejecting {
                return Err(MailError::Rejected {
                    status: 503,
                    body: "try later".to_string(),
                });
            }
            Ok(())
        }
    }

    fn context() -> BookingContext {
        BookingContext {
            booking_id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            listing_title: "Lakeside cabin".to_string(),
            guest_name: "Abebe".to_string(),
            guest_email: "abebe@example.com".to_string(),
            check_in: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
            number_of_guests: 2,
            total_price: BigDecimal::from(320),
        }
    }

    struct Fixture {
        handler: NotificationHandler,
        log: Arc<MemoryLog>,
        dead_letters: Arc<MemoryDeadLetters>,
        mail: Arc<CountingMail>,
        command: NotificationCommand,
    }

    fn fixture(log: MemoryLog, dead_letters: MemoryDeadLetters, rejecting: bool) -> Fixture {
        let booking = context();
        let command = NotificationCommand::booking_confirmation(booking.booking_id);
        let log = Arc::new(log);
        let dead_letters = Arc::new(dead_letters);
        let mail = Arc::new(CountingMail {
            calls: AtomicU32::new(0),
            rejecting,
        });
        let dispatcher = Dispatcher::new(
            Arc::new(OneBooking(booking)),
            Arc::new(TextOnly),
            mail.clone(),
            RetryPolicy {
                max_retries: 2,
                backoff: Duration::ZERO,
            },
            "http://localhost:3001".to_string(),
        );
        Fixture {
            handler: NotificationHandler::new(log.clone(), dead_letters.clone(), Arc::new(dispatcher), 4),
            log,
            dead_letters,
            mail,
            command,
        }
    }

    #[tokio::test]
    async fn repeated_command_is_sent_once() {
        let f = fixture(MemoryLog::default(), MemoryDeadLetters::default(), false);

        assert!(f.handler.handle_command(f.command.clone()).await);
        assert!(f.handler.handle_command(f.command.clone()).await);

        assert_eq!(AtomicU32::load(&f.mail.calls, Ordering::SeqCst), 1);
        let records = f.log.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].sent);
        assert_eq!(records[0].idempotency_key, f.command.idempotency_key);
    }

    #[tokio::test]
    async fn exhausted_delivery_is_dead_lettered() {
        let f = fixture(MemoryLog::default(), MemoryDeadLetters::default(), true);

        assert!(f.handler.handle_command(f.command.clone()).await);

        assert_eq!(AtomicU32::load(&f.mail.calls, Ordering::SeqCst), 3);
        assert_eq!(*f.dead_letters.published.lock().unwrap(), vec![f.command.id]);
        assert!(f.log.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_dead_letter_leaves_command_unsettled() {
        let dead_letters = MemoryDeadLetters {
            broken: true,
            ..Default::default()
        };
        let f = fixture(MemoryLog::default(), dead_letters, true);

        assert!(!f.handler.handle_command(f.command.clone()).await);
    }

    #[tokio::test]
    async fn storage_failure_after_send_is_not_dead_lettered() {
        let log = MemoryLog {
            broken: true,
            ..Default::default()
        };
        let f = fixture(log, MemoryDeadLetters::default(), false);

        assert!(!f.handler.handle_command(f.command.clone()).await);

        assert_eq!(AtomicU32::load(&f.mail.calls, Ordering::SeqCst), 1);
        assert!(f.dead_letters.published.lock().unwrap().is_empty());
    }
}
