use crate::entities::upload_sessions::{self, UploadStatus};
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

/// Authoritative record of every upload session.
///
/// `received_length` and `status` only change through the guarded updates
/// below; each one matches on the state the caller last observed and reports
/// whether it applied, so a stale writer can never overwrite a newer offset.
#[derive(Clone)]
pub struct SessionRegistry {
    db: DatabaseConnection,
}

/// Fields of a session at creation time.
pub struct NewSession {
    pub id: Uuid,
    pub declared_length: i64,
    pub storage_key: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn insert(&self, session: NewSession) -> Result<upload_sessions::Model, DbErr> {
        upload_sessions::ActiveModel {
            id: Set(session.id),
            declared_length: Set(session.declared_length),
            received_length: Set(0),
            storage_key: Set(session.storage_key),
            status: Set(UploadStatus::Pending),
            metadata: Set(session.metadata),
            artifact_reference: Set(None),
            error_detail: Set(None),
            created_at: Set(session.created_at),
            updated_at: Set(session.created_at),
            started_at: Set(None),
            completed_at: Set(None),
            failed_at: Set(None),
            aborted_at: Set(None),
            expires_at: Set(session.expires_at),
        }
        .insert(&self.db)
        .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<upload_sessions::Model>, DbErr> {
        upload_sessions::Entity::find_by_id(id).one(&self.db).await
    }

    /// Moves the offset from `from` to `to` and marks the session `Uploading`.
    pub async fn advance(
        &self,
        session: &upload_sessions::Model,
        to: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let started_at = session.started_at.unwrap_or(now);
        let result = upload_sessions::Entity::update_many()
            .col_expr(upload_sessions::Column::ReceivedLength, Expr::value(to))
            .col_expr(
                upload_sessions::Column::Status,
                Expr::value(UploadStatus::Uploading.into_value()),
            )
            .col_expr(upload_sessions::Column::StartedAt, Expr::value(Some(started_at)))
            .col_expr(upload_sessions::Column::UpdatedAt, Expr::value(now))
            .filter(upload_sessions::Column::Id.eq(session.id))
            .filter(upload_sessions::Column::ReceivedLength.eq(session.received_length))
            .filter(upload_sessions::Column::Status.is_in(UploadStatus::ACTIVE))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// `Pending -> Uploading` without moving the offset (an append was attempted and failed).
    pub async fn mark_uploading(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DbErr> {
        let result = upload_sessions::Entity::update_many()
            .col_expr(
                upload_sessions::Column::Status,
                Expr::value(UploadStatus::Uploading.into_value()),
            )
            .col_expr(upload_sessions::Column::UpdatedAt, Expr::value(now))
            .filter(upload_sessions::Column::Id.eq(id))
            .filter(upload_sessions::Column::Status.eq(UploadStatus::Pending))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// `Uploading -> Completed`, only for a fully received session.
    pub async fn mark_completed(
        &self,
        session: &upload_sessions::Model,
        artifact_reference: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = upload_sessions::Entity::update_many()
            .col_expr(
                upload_sessions::Column::Status,
                Expr::value(UploadStatus::Completed.into_value()),
            )
            .col_expr(
                upload_sessions::Column::ArtifactReference,
                Expr::value(Some(artifact_reference.to_string())),
            )
            .col_expr(upload_sessions::Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(upload_sessions::Column::UpdatedAt, Expr::value(now))
            .filter(upload_sessions::Column::Id.eq(session.id))
            .filter(upload_sessions::Column::Status.eq(UploadStatus::Uploading))
            .filter(upload_sessions::Column::ReceivedLength.eq(session.declared_length))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn mark_aborted(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DbErr> {
        let result = upload_sessions::Entity::update_many()
            .col_expr(
                upload_sessions::Column::Status,
                Expr::value(UploadStatus::Aborted.into_value()),
            )
            .col_expr(upload_sessions::Column::AbortedAt, Expr::value(Some(now)))
            .col_expr(upload_sessions::Column::UpdatedAt, Expr::value(now))
            .filter(upload_sessions::Column::Id.eq(id))
            .filter(upload_sessions::Column::Status.is_in(UploadStatus::ACTIVE))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn mark_failed(
        &self,
        id: Uuid,
        error_detail: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = upload_sessions::Entity::update_many()
            .col_expr(
                upload_sessions::Column::Status,
                Expr::value(UploadStatus::Failed.into_value()),
            )
            .col_expr(
                upload_sessions::Column::ErrorDetail,
                Expr::value(Some(error_detail.to_string())),
            )
            .col_expr(upload_sessions::Column::FailedAt, Expr::value(Some(now)))
            .col_expr(upload_sessions::Column::UpdatedAt, Expr::value(now))
            .filter(upload_sessions::Column::Id.eq(id))
            .filter(upload_sessions::Column::Status.is_in(UploadStatus::ACTIVE))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Non-terminal sessions whose deadline passed before `now`, oldest first.
    pub async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<upload_sessions::Model>, DbErr> {
        upload_sessions::Entity::find()
            .filter(upload_sessions::Column::Status.is_in(UploadStatus::ACTIVE))
            .filter(upload_sessions::Column::ExpiresAt.lt(now))
            .order_by_asc(upload_sessions::Column::ExpiresAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    pub async fn ping(&self) -> bool {
        self.db.ping().await.is_ok()
    }
}
