use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{account, notification};
use crate::errors::ServiceError;

/// A message addressed to one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundNotice {
    pub account_id: Uuid,
    pub title: String,
    pub message: String,
}

impl OutboundNotice {
    pub fn new(account_id: Uuid, title: &str, message: String) -> Self {
        Self {
            account_id,
            title: title.to_string(),
            message,
        }
    }
}

/// Contact details resolved from the recipient's account.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub account_id: Uuid,
    pub phone: String,
    pub email: Option<String>,
}

/// Outbound transport (SMS, email, push).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, recipient: &Recipient, notice: &OutboundNotice)
        -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Sms,
    Email,
}

/// Writes the message to the log instead of calling a gateway.
#[derive(Debug, Clone)]
pub struct LoggingChannel {
    kind: ChannelKind,
}

impl LoggingChannel {
    pub fn sms() -> Self {
        Self {
            kind: ChannelKind::Sms,
        }
    }

    pub fn email() -> Self {
        Self {
            kind: ChannelKind::Email,
        }
    }
}

#[async_trait]
impl NotificationChannel for LoggingChannel {
    fn name(&self) -> &'static str {
        match self.kind {
            ChannelKind::Sms => "sms",
            ChannelKind::Email => "email",
        }
    }

    async fn send(
        &self,
        recipient: &Recipient,
        notice: &OutboundNotice,
    ) -> Result<(), ServiceError> {
        match self.kind {
            ChannelKind::Sms => {
                info!(channel = "sms", to = %recipient.phone, title = %notice.title, body = %notice.message, "notification sent");
            }
            ChannelKind::Email => match &recipient.email {
                Some(email) => {
                    info!(channel = "email", to = %email, title = %notice.title, body = %notice.message, "notification sent");
                }
                None => {
                    debug!(account_id = %recipient.account_id, "no email on file, skipping");
                }
            },
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationService {
    db_pool: Arc<DbPool>,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationService {
    pub fn new(db_pool: Arc<DbPool>, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { db_pool, channels }
    }

    /// SMS and email logging channels.
    pub fn with_logging_channels(db_pool: Arc<DbPool>) -> Self {
        Self::new(
            db_pool,
            vec![
                Arc::new(LoggingChannel::sms()),
                Arc::new(LoggingChannel::email()),
            ],
        )
    }

    /// Stores the in-app copy then fans out to every channel. A failing
    /// channel does not stop the others.
    #[instrument(skip(self, notice), fields(account_id = %notice.account_id))]
    pub async fn deliver(&self, notice: OutboundNotice) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let account = account::Entity::find_by_id(notice.account_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Account {} not found", notice.account_id))
            })?;

        notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account.id),
            title: Set(notice.title.clone()),
            message: Set(notice.message.clone()),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to store notification");
            ServiceError::DatabaseError(e)
        })?;

        let recipient = Recipient {
            account_id: account.id,
            phone: account.phone,
            email: account.email,
        };

        for channel in &self.channels {
            if let Err(e) = channel.send(&recipient, &notice).await {
                warn!(channel = channel.name(), error = %e, "Notification channel failed");
            }
        }

        Ok(())
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list_for_account(
        &self,
        account_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<notification::Model>, u64), ServiceError> {
        let paginator = notification::Entity::find()
            .filter(notification::Column::AccountId.eq(account_id))
            .order_by_desc(notification::Column::CreatedAt)
            .paginate(&*self.db_pool, limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    /// Only the recipient can mark their own notification.
    #[instrument(skip(self))]
    pub async fn mark_read(
        &self,
        account_id: Uuid,
        notification_id: Uuid,
    ) -> Result<notification::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = notification::Entity::find_by_id(notification_id)
            .filter(notification::Column::AccountId.eq(account_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Notification not found".to_string()))?;

        if existing.is_read {
            return Ok(existing);
        }

        let mut active: notification::ActiveModel = existing.into();
        active.is_read = Set(true);
        Ok(active.update(db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::account::AccountRole;

    async fn seed_account(db: &DbPool, email: Option<&str>) -> account::Model {
        account::ActiveModel {
            id: Set(Uuid::new_v4()),
            role: Set(AccountRole::Customer),
            name: Set("Ravi".into()),
            email: Set(email.map(str::to_string)),
            phone: Set(format!("+91{}", &Uuid::new_v4().simple().to_string()[..10])),
            password_hash: Set("x".into()),
            dob: Set(None),
            gender: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn deliver_stores_row_and_dispatches_to_each_channel() {
        let pool = Arc::new(crate::db::migrated_memory_pool().await);
        let acct = seed_account(&pool, Some("ravi@example.com")).await;
        let acct_id = acct.id;

        let mut sms = MockNotificationChannel::new();
        sms.expect_name().return_const("sms");
        sms.expect_send()
            .withf(move |r, n| r.account_id == acct_id && n.title == "Order delivered")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut failing = MockNotificationChannel::new();
        failing.expect_name().return_const("email");
        failing
            .expect_send()
            .times(1)
            .returning(|_, _| Err(ServiceError::InternalError("gateway down".into())));

        let service = NotificationService::new(pool.clone(), vec![Arc::new(failing), Arc::new(sms)]);
        service
            .deliver(OutboundNotice::new(
                acct.id,
                "Order delivered",
                "Your order has been delivered.".into(),
            ))
            .await
            .unwrap();

        let (items, total) = service.list_for_account(acct.id, 1, 20).await.unwrap();
        assert_eq!(total, 1);
        assert!(!items[0].is_read);
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_recipient() {
        let pool = Arc::new(crate::db::migrated_memory_pool().await);
        let owner = seed_account(&pool, None).await;
        let other = seed_account(&pool, None).await;
        let service = NotificationService::with_logging_channels(pool.clone());

        service
            .deliver(OutboundNotice::new(owner.id, "Hi", "Hello".into()))
            .await
            .unwrap();
        let (items, _) = service.list_for_account(owner.id, 1, 20).await.unwrap();
        let id = items[0].id;

        assert!(matches!(
            service.mark_read(other.id, id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(service.mark_read(owner.id, id).await.unwrap().is_read);
    }

    #[tokio::test]
    async fn unknown_recipient_is_not_found() {
        let pool = Arc::new(crate::db::migrated_memory_pool().await);
        let service = NotificationService::with_logging_channels(pool);
        let result = service
            .deliver(OutboundNotice::new(Uuid::new_v4(), "x", "y".into()))
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
