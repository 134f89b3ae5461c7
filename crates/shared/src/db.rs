//! Postgres implementation of the scheduling [`Store`]
//!
//! The `(recurring_rule_id, occurrence_date)` uniqueness lives in the partial
//! index `appointments_rule_occurrence_key`; inserts rely on it through
//! `ON CONFLICT ... DO NOTHING` instead of checking first.

use cadence_core::error::StoreError;
use cadence_core::models::{
    Appointment, AppointmentPatch, Client, FinancialEntry, NewAppointment, NewFinancialEntry,
    RecurringRule,
};
use cadence_core::rule::ValidRule;
use cadence_core::store::{FinanceFilter, Store, StoreResult, UpsertOutcome};
use cadence_core::types::{AppointmentId, ClientId, FinancialEntryId, OwnerId, RuleId};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Store backed by a shared connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn seconds(duration: Duration) -> f64 {
    duration.num_seconds() as f64
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_active_rules(
        &self,
        owner_id: OwnerId,
        rule_id: Option<RuleId>,
    ) -> StoreResult<Vec<RecurringRule>> {
        let rules = sqlx::query_as::<_, RecurringRule>(
            r#"
            SELECT * FROM recurring_rules
            WHERE owner_id = $1 AND active AND ($2::uuid IS NULL OR id = $2)
            ORDER BY created_at, id
            "#,
        )
        .bind(owner_id)
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }

    async fn find_rule(&self, rule_id: RuleId) -> StoreResult<Option<RecurringRule>> {
        let rule = sqlx::query_as::<_, RecurringRule>("SELECT * FROM recurring_rules WHERE id = $1")
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(rule)
    }

    async fn find_owners_with_active_rules(&self) -> StoreResult<Vec<OwnerId>> {
        let owners = sqlx::query_scalar::<_, OwnerId>(
            "SELECT DISTINCT owner_id FROM recurring_rules WHERE active ORDER BY owner_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(owners)
    }

    async fn create_rule(&self, owner_id: OwnerId, rule: &ValidRule) -> StoreResult<RecurringRule> {
        let policy = &rule.policy;
        let row = sqlx::query_as::<_, RecurringRule>(
            r#"
            INSERT INTO recurring_rules (
                owner_id, client_id, title, weekdays, time_of_day, timezone,
                interval_weeks, start_date, end_date, max_occurrences, amount, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(rule.client_id)
        .bind(&rule.title)
        .bind(policy.weekdays.to_db())
        .bind(policy.time_of_day)
        .bind(policy.timezone.as_str())
        .bind(policy.interval_weeks)
        .bind(policy.start_date)
        .bind(policy.end_date)
        .bind(policy.max_occurrences)
        .bind(rule.amount)
        .bind(rule.active)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update_rule(
        &self,
        rule_id: RuleId,
        rule: &ValidRule,
    ) -> StoreResult<Option<RecurringRule>> {
        let policy = &rule.policy;
        let row = sqlx::query_as::<_, RecurringRule>(
            r#"
            UPDATE recurring_rules SET
                client_id = $2, title = $3, weekdays = $4, time_of_day = $5,
                timezone = $6, interval_weeks = $7, start_date = $8, end_date = $9,
                max_occurrences = $10, amount = $11, active = $12, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(rule_id)
        .bind(rule.client_id)
        .bind(&rule.title)
        .bind(policy.weekdays.to_db())
        .bind(policy.time_of_day)
        .bind(policy.timezone.as_str())
        .bind(policy.interval_weeks)
        .bind(policy.start_date)
        .bind(policy.end_date)
        .bind(policy.max_occurrences)
        .bind(rule.amount)
        .bind(rule.active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_client(&self, client_id: ClientId) -> StoreResult<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            "SELECT id, owner_id, name, package_price FROM clients WHERE id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    async fn upsert_appointment(&self, new: &NewAppointment) -> StoreResult<UpsertOutcome> {
        let inserted = sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointments (
                owner_id, recurring_rule_id, client_id, client_name, service,
                start_at, end_at, occurrence_date, time_of_day, timezone,
                amount, payment_method, notes, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (recurring_rule_id, occurrence_date)
                WHERE recurring_rule_id IS NOT NULL
                DO NOTHING
            RETURNING *
            "#,
        )
        .bind(new.owner_id)
        .bind(new.recurring_rule_id)
        .bind(new.client_id)
        .bind(&new.client_name)
        .bind(&new.service)
        .bind(new.start_at)
        .bind(new.end_at)
        .bind(new.occurrence_date)
        .bind(new.time_of_day)
        .bind(new.timezone.as_str())
        .bind(new.amount)
        .bind(&new.payment_method)
        .bind(&new.notes)
        .bind(new.status)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(UpsertOutcome::Created(row));
        }

        // Lost to an existing row; hand it back for the caller to inspect
        let existing = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments WHERE recurring_rule_id = $1 AND occurrence_date = $2",
        )
        .bind(new.recurring_rule_id)
        .bind(new.occurrence_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(UpsertOutcome::Conflict(existing))
    }

    async fn create_appointment(&self, new: &NewAppointment) -> StoreResult<Appointment> {
        let row = sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointments (
                owner_id, recurring_rule_id, client_id, client_name, service,
                start_at, end_at, occurrence_date, time_of_day, timezone,
                amount, payment_method, notes, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(new.owner_id)
        .bind(new.recurring_rule_id)
        .bind(new.client_id)
        .bind(&new.client_name)
        .bind(&new.service)
        .bind(new.start_at)
        .bind(new.end_at)
        .bind(new.occurrence_date)
        .bind(new.time_of_day)
        .bind(new.timezone.as_str())
        .bind(new.amount)
        .bind(&new.payment_method)
        .bind(&new.notes)
        .bind(new.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_appointment(&self, id: AppointmentId) -> StoreResult<Option<Appointment>> {
        let row = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_appointments(
        &self,
        owner_id: OwnerId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT * FROM appointments
            WHERE owner_id = $1
              AND ($2::timestamptz IS NULL OR start_at >= $2)
              AND ($3::timestamptz IS NULL OR start_at < $3)
            ORDER BY start_at, id
            "#,
        )
        .bind(owner_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_future_appointments(
        &self,
        owner_id: OwnerId,
        rule_id: Option<RuleId>,
        from: NaiveDate,
    ) -> StoreResult<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT * FROM appointments
            WHERE owner_id = $1
              AND occurrence_date >= $3
              AND ($2::uuid IS NULL OR recurring_rule_id = $2)
            ORDER BY start_at, id
            "#,
        )
        .bind(owner_id)
        .bind(rule_id)
        .bind(from)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_appointments_by_ids(&self, ids: &[AppointmentId]) -> StoreResult<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments WHERE id = ANY($1) ORDER BY start_at, id",
        )
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_overlapping_appointments(
        &self,
        owner_id: OwnerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        default_duration: Duration,
    ) -> StoreResult<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT * FROM appointments
            WHERE owner_id = $1
              AND start_at < $3
              AND COALESCE(end_at, start_at + make_interval(secs => $4)) > $2
            ORDER BY start_at, id
            "#,
        )
        .bind(owner_id)
        .bind(start)
        .bind(end)
        .bind(seconds(default_duration))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn update_appointment(
        &self,
        id: AppointmentId,
        patch: &AppointmentPatch,
    ) -> StoreResult<Option<Appointment>> {
        let row = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments SET
                recurring_rule_id = COALESCE($2, recurring_rule_id),
                client_id = COALESCE($3, client_id),
                client_name = COALESCE($4, client_name),
                service = COALESCE($5, service),
                start_at = COALESCE($6, start_at),
                end_at = COALESCE($7, end_at),
                occurrence_date = COALESCE($8, occurrence_date),
                time_of_day = COALESCE($9, time_of_day),
                timezone = COALESCE($10, timezone),
                amount = COALESCE($11, amount),
                payment_method = COALESCE($12, payment_method),
                notes = COALESCE($13, notes),
                status = COALESCE($14, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.recurring_rule_id)
        .bind(patch.client_id)
        .bind(&patch.client_name)
        .bind(&patch.service)
        .bind(patch.start_at)
        .bind(patch.end_at)
        .bind(patch.occurrence_date)
        .bind(patch.time_of_day)
        .bind(patch.timezone.map(|tz| tz.as_str()))
        .bind(patch.amount)
        .bind(&patch.payment_method)
        .bind(&patch.notes)
        .bind(patch.status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete_appointments(&self, ids: &[AppointmentId]) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = ANY($1)")
            .bind(uuids(ids))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn complete_past_appointments(
        &self,
        now: DateTime<Utc>,
        default_duration: Duration,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET status = 'completed', updated_at = NOW()
            WHERE status = 'scheduled'
              AND COALESCE(end_at, start_at + make_interval(secs => $2)) <= $1
            "#,
        )
        .bind(now)
        .bind(seconds(default_duration))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_financial_entries(&self, filter: &FinanceFilter) -> StoreResult<Vec<FinancialEntry>> {
        let rows = match filter {
            FinanceFilter::AppointmentIds(ids) => {
                sqlx::query_as::<_, FinancialEntry>(
                    r#"
                    SELECT * FROM financial_entries
                    WHERE appointment_id = ANY($1)
                    ORDER BY due_date, created_at, id
                    "#,
                )
                .bind(uuids(ids))
                .fetch_all(&self.pool)
                .await?
            }
            FinanceFilter::Owner(owner_id) => {
                sqlx::query_as::<_, FinancialEntry>(
                    "SELECT * FROM financial_entries WHERE owner_id = $1 ORDER BY due_date, created_at, id",
                )
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?
            }
            FinanceFilter::DueFrom {
                owner_id,
                from,
                status,
            } => {
                sqlx::query_as::<_, FinancialEntry>(
                    r#"
                    SELECT * FROM financial_entries
                    WHERE owner_id = $1
                      AND due_date >= $2
                      AND ($3::finance_status IS NULL OR status = $3)
                    ORDER BY due_date, created_at, id
                    "#,
                )
                .bind(owner_id)
                .bind(from)
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }

    async fn insert_financial_entry(&self, entry: &NewFinancialEntry) -> StoreResult<FinancialEntry> {
        let row = sqlx::query_as::<_, FinancialEntry>(
            r#"
            INSERT INTO financial_entries (
                owner_id, due_date, amount, status, kind, note, appointment_id, recurring_rule_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(entry.owner_id)
        .bind(entry.due_date)
        .bind(entry.amount)
        .bind(entry.status)
        .bind(entry.kind)
        .bind(&entry.note)
        .bind(entry.appointment_id)
        .bind(entry.recurring_rule_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update_financial_entry_amount(
        &self,
        id: FinancialEntryId,
        amount: Decimal,
    ) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE financial_entries SET amount = $2 WHERE id = $1")
            .bind(id)
            .bind(amount)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_financial_entries(&self, ids: &[FinancialEntryId]) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM financial_entries WHERE id = ANY($1)")
            .bind(uuids(ids))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::SchedulingConfig;
    use cadence_core::engine::{derive_financial_projections, materialize, prune_on_deactivate};
    use cadence_core::rule::RuleDraft;
    use chrono::TimeZone;

    fn draft(client_id: Option<ClientId>) -> ValidRule {
        RuleDraft {
            title: "Pilates".to_string(),
            client_id,
            weekdays: vec![1, 4],
            time_of_day: "19:00".to_string(),
            timezone: "America/Sao_Paulo".to_string(),
            interval_weeks: 1,
            start_date: "2026-03-02".to_string(),
            end_date: None,
            max_occurrences: None,
            amount: Some(Decimal::from(50)),
            active: true,
        }
        .validate()
        .unwrap()
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_materialize_lifecycle_against_postgres(pool: PgPool) {
        let store = PgStore::new(pool);
        let owner = OwnerId::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        let client_id = sqlx::query_scalar::<_, ClientId>(
            "INSERT INTO clients (owner_id, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(owner)
        .bind("Carla")
        .fetch_one(store.pool())
        .await
        .unwrap();

        let rule = store.create_rule(owner, &draft(Some(client_id))).await.unwrap();
        let config = SchedulingConfig::default();

        let first = materialize(&store, &config, owner, None, now, Some(14)).await.unwrap();
        let second = materialize(&store, &config, owner, None, now, Some(14)).await.unwrap();
        assert_eq!(first.created, 4);
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 4);

        let projections = derive_financial_projections(&store, owner, now).await.unwrap();
        assert_eq!(projections.finance_created, 4);

        let pruned = prune_on_deactivate(&store, rule.id, now, config.default_duration())
            .await
            .unwrap();
        assert_eq!(pruned.appointments_removed, 4);
        assert_eq!(pruned.finance_removed, 4);
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_unique_index_rejects_duplicate_occurrence(pool: PgPool) {
        let store = PgStore::new(pool);
        let owner = OwnerId::new();
        let rule = store.create_rule(owner, &draft(None)).await.unwrap();

        let start_at = Utc.with_ymd_and_hms(2026, 3, 2, 22, 0, 0).unwrap();
        let new = NewAppointment {
            owner_id: owner,
            recurring_rule_id: Some(rule.id),
            client_id: None,
            client_name: None,
            service: Some("Pilates".to_string()),
            start_at,
            end_at: None,
            occurrence_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            time_of_day: rule.policy.time_of_day,
            timezone: rule.policy.timezone,
            amount: None,
            payment_method: None,
            notes: None,
            status: cadence_core::models::AppointmentStatus::Scheduled,
        };

        let created = match store.upsert_appointment(&new).await.unwrap() {
            UpsertOutcome::Created(row) => row,
            other => panic!("Expected a new row, got {:?}", other),
        };
        match store.upsert_appointment(&new).await.unwrap() {
            UpsertOutcome::Conflict(existing) => assert_eq!(existing.id, created.id),
            other => panic!("Expected a conflict, got {:?}", other),
        }
        assert!(matches!(
            store.create_appointment(&new).await,
            Err(StoreError::UniqueViolation(_))
        ));
    }
}
