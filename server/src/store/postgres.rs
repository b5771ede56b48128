use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{EntityKind, Scope, Store, StoreError, StoreResult};
use crate::auth::Role;
use crate::models::{
    Event, EventChanges, EventFilter, NewEvent, NewNotification, NewOrganizer, NewParticipant,
    NewRegistration, Notification, NotificationKind, Organizer, Participant, Recipient,
    Registration, RegistrationFilter, RegistrationStatus,
};
use crate::utils::pagination::{Page, PageRequest};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(
                    describe_constraint(db_err.constraint()).to_string(),
                );
            }
        }
        StoreError::Database(err)
    }
}

fn describe_constraint(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("registrations_open_slot_idx") => {
            "Participant already holds a registration for this event"
        }
        Some("participants_email_key") | Some("organizers_email_key") => {
            "Email address is already in use"
        }
        Some("participants_account_id_key") | Some("organizers_account_id_key") => {
            "Account already has a profile"
        }
        _ => "Record already exists",
    }
}

/// Serializes profile creation per account and rejects the account when the
/// other profile table already holds it. The lock is released with `tx`.
async fn claim_account(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    other_table: &str,
) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::uuid::text))")
        .bind(account_id)
        .execute(&mut **tx)
        .await?;

    let taken: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE account_id = $1)",
        other_table
    ))
    .bind(account_id)
    .fetch_one(&mut **tx)
    .await?;
    if taken {
        return Err(StoreError::UniqueViolation(
            "Account already has a profile".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn resolve_role(&self, account_id: Uuid) -> StoreResult<Role> {
        let participant: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM participants WHERE account_id = $1 AND NOT is_deleted",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(id) = participant {
            return Ok(Role::Participant(id));
        }

        let organizer: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM organizers WHERE account_id = $1 AND NOT is_deleted",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(organizer.map(Role::Organizer).unwrap_or(Role::Anonymous))
    }

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (
                id, organizer_id, title, description, location, start_time, end_time,
                capacity, event_type, price, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.organizer_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.capacity)
        .bind(event.event_type)
        .bind(event.price)
        .bind(event.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(event)
    }

    async fn find_event(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE id = $1 AND ($2 OR NOT is_deleted)",
        )
        .bind(id)
        .bind(scope.includes_deleted())
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn update_event(&self, id: Uuid, changes: EventChanges) -> StoreResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                location = COALESCE($4, location),
                start_time = COALESCE($5, start_time),
                end_time = COALESCE($6, end_time),
                capacity = COALESCE($7, capacity),
                event_type = COALESCE($8, event_type),
                price = COALESCE($9, price),
                is_active = COALESCE($10, is_active),
                updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.location)
        .bind(changes.start_time)
        .bind(changes.end_time)
        .bind(changes.capacity)
        .bind(changes.event_type)
        .bind(changes.price)
        .bind(changes.is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Event>> {
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR organizer_id = $1)
              AND ($2::bool IS NULL OR is_active = $2)
              AND ($3 OR NOT is_deleted)
        "#;

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM events {}", WHERE))
            .bind(filter.organizer_id)
            .bind(filter.is_active)
            .bind(filter.include_deleted)
            .fetch_one(&self.pool)
            .await?;

        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT * FROM events {} ORDER BY start_time ASC, id LIMIT $4 OFFSET $5",
            WHERE
        ))
        .bind(filter.organizer_id)
        .bind(filter.is_active)
        .bind(filter.include_deleted)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(events, count, page))
    }

    async fn count_registrations(&self, event_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM registrations
            WHERE event_id = $1 AND NOT is_deleted AND status <> 'cancelled'
            "#,
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_participant(&self, participant: NewParticipant) -> StoreResult<Participant> {
        let mut tx = self.pool.begin().await?;
        claim_account(&mut tx, participant.account_id, "organizers").await?;

        let participant = sqlx::query_as::<_, Participant>(
            r#"
            INSERT INTO participants (id, account_id, name, email)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(participant.account_id)
        .bind(participant.name.trim())
        .bind(participant.email.trim().to_lowercase())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(participant)
    }

    async fn find_participant(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Participant>> {
        let participant = sqlx::query_as::<_, Participant>(
            "SELECT * FROM participants WHERE id = $1 AND ($2 OR NOT is_deleted)",
        )
        .bind(id)
        .bind(scope.includes_deleted())
        .fetch_optional(&self.pool)
        .await?;
        Ok(participant)
    }

    async fn list_participants(&self, page: PageRequest) -> StoreResult<Page<Participant>> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM participants WHERE NOT is_deleted")
                .fetch_one(&self.pool)
                .await?;
        let participants = sqlx::query_as::<_, Participant>(
            "SELECT * FROM participants WHERE NOT is_deleted ORDER BY name, id LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(participants, count, page))
    }

    async fn insert_organizer(&self, organizer: NewOrganizer) -> StoreResult<Organizer> {
        let mut tx = self.pool.begin().await?;
        if let Some(account_id) = organizer.account_id {
            claim_account(&mut tx, account_id, "participants").await?;
        }

        let organizer = sqlx::query_as::<_, Organizer>(
            r#"
            INSERT INTO organizers (id, account_id, name, email, phone, company)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(organizer.account_id)
        .bind(organizer.name.trim())
        .bind(organizer.email.trim().to_lowercase())
        .bind(organizer.phone)
        .bind(organizer.company)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(organizer)
    }

    async fn find_organizer(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Organizer>> {
        let organizer = sqlx::query_as::<_, Organizer>(
            "SELECT * FROM organizers WHERE id = $1 AND ($2 OR NOT is_deleted)",
        )
        .bind(id)
        .bind(scope.includes_deleted())
        .fetch_optional(&self.pool)
        .await?;
        Ok(organizer)
    }

    async fn list_organizers(&self, page: PageRequest) -> StoreResult<Page<Organizer>> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM organizers WHERE NOT is_deleted")
                .fetch_one(&self.pool)
                .await?;
        let organizers = sqlx::query_as::<_, Organizer>(
            "SELECT * FROM organizers WHERE NOT is_deleted ORDER BY name, id LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(organizers, count, page))
    }

    async fn insert_registration(
        &self,
        registration: NewRegistration,
    ) -> StoreResult<Registration> {
        // registrations_open_slot_idx serializes racing inserts for the same pair.
        let registration = sqlx::query_as::<_, Registration>(
            r#"
            INSERT INTO registrations (id, participant_id, event_id, status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(registration.participant_id)
        .bind(registration.event_id)
        .bind(registration.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(registration)
    }

    async fn find_registration(
        &self,
        id: Uuid,
        scope: Scope,
    ) -> StoreResult<Option<Registration>> {
        let registration = sqlx::query_as::<_, Registration>(
            "SELECT * FROM registrations WHERE id = $1 AND ($2 OR NOT is_deleted)",
        )
        .bind(id)
        .bind(scope.includes_deleted())
        .fetch_optional(&self.pool)
        .await?;
        Ok(registration)
    }

    async fn find_open_registration(
        &self,
        participant_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<Registration>> {
        let registration = sqlx::query_as::<_, Registration>(
            r#"
            SELECT * FROM registrations
            WHERE participant_id = $1 AND event_id = $2
              AND NOT is_deleted AND status <> 'cancelled'
            "#,
        )
        .bind(participant_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(registration)
    }

    async fn transition_registration(
        &self,
        id: Uuid,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreResult<Option<Registration>> {
        let registration = sqlx::query_as::<_, Registration>(
            r#"
            UPDATE registrations
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2 AND NOT is_deleted
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        Ok(registration)
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Registration>> {
        const FROM_WHERE: &str = r#"
            FROM registrations r
            JOIN events e ON e.id = r.event_id
            WHERE NOT r.is_deleted
              AND ($1::uuid IS NULL OR r.participant_id = $1)
              AND ($2::uuid IS NULL OR e.organizer_id = $2)
              AND ($3::uuid IS NULL OR r.event_id = $3)
              AND ($4::registration_status IS NULL OR r.status = $4)
        "#;

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {}", FROM_WHERE))
            .bind(filter.participant_id)
            .bind(filter.organizer_id)
            .bind(filter.event_id)
            .bind(filter.status)
            .fetch_one(&self.pool)
            .await?;

        let registrations = sqlx::query_as::<_, Registration>(&format!(
            "SELECT r.* {} ORDER BY r.registered_at DESC, r.id LIMIT $5 OFFSET $6",
            FROM_WHERE
        ))
        .bind(filter.participant_id)
        .bind(filter.organizer_id)
        .bind(filter.event_id)
        .bind(filter.status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(registrations, count, page))
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Option<Notification>> {
        // Both recipient-scoped unique indexes back the dedup check.
        let inserted = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (
                id, message, participant_id, organizer_id, event_id, registration_id, kind
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&notification.message)
        .bind(notification.recipient.participant_id())
        .bind(notification.recipient.organizer_id())
        .bind(notification.event_id)
        .bind(notification.registration_id)
        .bind(notification.kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn notification_exists(
        &self,
        recipient: Recipient,
        registration_id: Uuid,
        kind: NotificationKind,
    ) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM notifications
                WHERE participant_id IS NOT DISTINCT FROM $1
                  AND organizer_id IS NOT DISTINCT FROM $2
                  AND registration_id = $3
                  AND kind = $4
            )
            "#,
        )
        .bind(recipient.participant_id())
        .bind(recipient.organizer_id())
        .bind(registration_id)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_notification(
        &self,
        id: Uuid,
        scope: Scope,
    ) -> StoreResult<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE id = $1 AND ($2 OR NOT is_deleted)",
        )
        .bind(id)
        .bind(scope.includes_deleted())
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET updated_at = CASE WHEN is_read THEN updated_at ELSE NOW() END,
                is_read = TRUE
            WHERE id = $1 AND NOT is_deleted
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        recipient: Recipient,
        page: PageRequest,
    ) -> StoreResult<Page<Notification>> {
        const WHERE: &str = r#"
            WHERE NOT is_deleted
              AND participant_id IS NOT DISTINCT FROM $1
              AND organizer_id IS NOT DISTINCT FROM $2
        "#;

        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM notifications {}", WHERE))
                .bind(recipient.participant_id())
                .bind(recipient.organizer_id())
                .fetch_one(&self.pool)
                .await?;

        let notifications = sqlx::query_as::<_, Notification>(&format!(
            "SELECT * FROM notifications {} ORDER BY created_at DESC, id LIMIT $3 OFFSET $4",
            WHERE
        ))
        .bind(recipient.participant_id())
        .bind(recipient.organizer_id())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(notifications, count, page))
    }

    async fn count_unread(&self, recipient: Recipient) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE NOT is_deleted AND NOT is_read
              AND participant_id IS NOT DISTINCT FROM $1
              AND organizer_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(recipient.participant_id())
        .bind(recipient.organizer_id())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn soft_delete(&self, kind: EntityKind, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            "#,
            kind.table()
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn restore(&self, kind: EntityKind, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET is_deleted = FALSE, deleted_at = NULL, updated_at = NOW()
            WHERE id = $1 AND is_deleted
            "#,
            kind.table()
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
