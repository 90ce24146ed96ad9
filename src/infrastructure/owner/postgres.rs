//! PostgreSQL owner repository

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::owner::{BillingPlan, Owner, OwnerId, OwnerRepository, OwnerRole};
use crate::domain::DomainError;

#[derive(Debug, Clone)]
pub struct PostgresOwnerRepository {
    pool: PgPool,
}

impl PostgresOwnerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_owner(row: &PgRow) -> Result<Owner, DomainError> {
        let role: String = row.try_get("role")?;
        let plan: String = row.try_get("plan")?;

        let role = OwnerRole::parse(&role)
            .ok_or_else(|| DomainError::storage(format!("Unknown owner role '{}'", role)))?;
        let plan = BillingPlan::parse(&plan)
            .ok_or_else(|| DomainError::storage(format!("Unknown billing plan '{}'", plan)))?;

        Ok(Owner::new(
            OwnerId::new(row.try_get::<String, _>("id")?)?,
            row.try_get::<String, _>("email")?,
        )
        .with_role(role)
        .with_plan(plan)
        .with_created_at(row.try_get("created_at")?))
    }
}

#[async_trait]
impl OwnerRepository for PostgresOwnerRepository {
    async fn get(&self, id: &OwnerId) -> Result<Option<Owner>, DomainError> {
        let row = sqlx::query("SELECT id, email, role, plan, created_at FROM owners WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_owner).transpose()
    }

    async fn create(&self, owner: Owner) -> Result<Owner, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO owners (id, email, role, plan, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(owner.id().as_str())
        .bind(owner.email())
        .bind(owner.role().as_str())
        .bind(owner.plan().as_str())
        .bind(owner.created_at())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::conflict(format!(
                "Owner '{}' already exists",
                owner.id()
            )));
        }

        Ok(owner)
    }

    async fn set_plan(&self, id: &OwnerId, plan: BillingPlan) -> Result<Owner, DomainError> {
        let row = sqlx::query(
            "UPDATE owners SET plan = $2 WHERE id = $1 RETURNING id, email, role, plan, created_at",
        )
        .bind(id.as_str())
        .bind(plan.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_owner(&row),
            None => Err(DomainError::not_found(format!("Owner '{}' not found", id))),
        }
    }
}
