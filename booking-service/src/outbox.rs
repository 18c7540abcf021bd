use anyhow::Result;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::NotificationCommand;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

use crate::models::*;
use crate::schema::*;
use crate::DbPool;

/// Records a notification in the outbox. Delivery to the work queue happens
/// later in [`OutboxProcessor`], so the caller never waits on the broker.
pub async fn enqueue(conn: &mut AsyncPgConnection, command: &NotificationCommand) -> Result<()> {
    let event = NewOutboxEvent::try_from(command)?;
    diesel::insert_into(outbox_events::table)
        .values(&event)
        .execute(conn)
        .await?;
    Ok(())
}

/// Best-effort variant for lifecycle side effects, run inside the caller's
/// transaction. The insert gets its own savepoint, so a failure is logged and
/// rolled back without failing the surrounding work.
pub async fn schedule(conn: &mut AsyncPgConnection, command: NotificationCommand) {
    let booking_id = command.booking_id;
    let kind = command.kind;
    let result = conn
        .transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move { enqueue(conn, &command).await })
        })
        .await;

    match result {
        Ok(()) => info!(%booking_id, %kind, "Scheduled notification"),
        Err(e) => warn!(%booking_id, %kind, "Failed to schedule notification: {}", e),
    }
}

pub struct OutboxProcessor {
    pool: DbPool,
    producer: FutureProducer,
    topic: String,
}

impl OutboxProcessor {
    pub fn new(pool: DbPool, producer: FutureProducer, topic: String) -> Self {
        Self { pool, producer, topic }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;

            if let Err(e) = self.process_outbox_events().await {
                error!("Error processing outbox events: {}", e);
            }
        }
    }

    async fn process_outbox_events(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let unprocessed_events = outbox_events::table
            .filter(outbox_events::processed.eq(false))
            .order(outbox_events::created_at.asc())
            .limit(100)
            .select(DbOutboxEvent::as_select())
            .load(&mut conn)
            .await?;

        for event in unprocessed_events {
            if let Err(e) = self.publish_event(&event).await {
                error!("Failed to publish event {}: {}", event.id, e);
                continue;
            }

            diesel::update(outbox_events::table.filter(outbox_events::id.eq(event.id)))
                .set(outbox_events::processed.eq(true))
                .execute(&mut conn)
                .await?;

            info!(event_type = %event.event_type, "Published outbox event: {}", event.id);
        }

        Ok(())
    }

    async fn publish_event(&self, event: &DbOutboxEvent) -> Result<()> {
        let json = serde_json::to_string(&event.event_data)?;
        let key = event.aggregate_id.to_string();
        let record = FutureRecord::to(&self.topic).payload(&json).key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish event: {}", e))?;

        Ok(())
    }
}
