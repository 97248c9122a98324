use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{otp as otp_codes, password, AuthService, TokenPair};
use crate::config::OtpWindows;
use crate::db::DbPool;
use crate::entities::account::{self, AccountRole};
use crate::entities::otp::{self, OtpPurpose};
use crate::entities::warehouse_profile::{self, IdentityType};
use crate::entities::{driver_profile, password_reset_token};
use crate::errors::ServiceError;
use crate::events::{emit, Event, EventSender};
use crate::services::sequences::{self, SequenceKind};

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+\d{1,13}$").expect("phone pattern compiles"));
static GSTIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").expect("gstin pattern compiles")
});
static AADHAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{12}$").expect("aadhar pattern compiles"));
static PAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").expect("pan pattern compiles"));
static OTP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").expect("otp pattern compiles"));

const INVALID_OTP: &str = "Invalid OTP.";
const ALREADY_VERIFIED: &str = "User is already verified.";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterCustomerRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(regex(path = "PHONE_RE", message = "Phone number must be entered in the format: '+999999999'. Up to 14 digits allowed."))]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterWarehouseRequest {
    #[serde(flatten)]
    #[validate]
    pub account: RegisterCustomerRequest,
    #[validate(length(min = 1, max = 200))]
    pub warehouse_name: String,
    pub identity_type: IdentityType,
    #[validate(regex(path = "GSTIN_RE", message = "Invalid GST number"))]
    pub gst_no: Option<String>,
    #[validate(length(equal = 14, message = "FSSAI number must be 14 characters"))]
    pub fssai_no: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub operation_area: String,
    #[validate(length(min = 1))]
    pub address: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterDriverRequest {
    #[serde(flatten)]
    #[validate]
    pub account: RegisterCustomerRequest,
    pub warehouse_id: Uuid,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 1, max = 50))]
    pub license_no: String,
    #[validate(regex(path = "AADHAR_RE", message = "Aadhar number must be 12 digits"))]
    pub aadhar_no: String,
    #[validate(regex(path = "PAN_RE", message = "Invalid PAN number"))]
    pub pan_no: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub vehicle_no: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegistrationResponse {
    pub account_id: Uuid,
    pub role: AccountRole,
    pub phone: String,
    pub warehouse_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct VerifyOtpRequest {
    #[validate(regex(path = "PHONE_RE", message = "Phone number must be entered in the format: '+999999999'. Up to 14 digits allowed."))]
    pub phone: String,
    #[validate(regex(path = "OTP_RE", message = "OTP must be 6 digits"))]
    pub otp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PhoneRequest {
    #[validate(regex(path = "PHONE_RE", message = "Phone number must be entered in the format: '+999999999'. Up to 14 digits allowed."))]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub tokens: TokenPair,
    pub account: AccountProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub dob: Option<NaiveDate>,
    #[validate(length(max = 20))]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetTokenResponse {
    pub reset_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirmRequest {
    #[validate(length(min = 1))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Account plus whichever role profile it has.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountProfile {
    pub id: Uuid,
    pub role: AccountRole,
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub dob: Option<NaiveDate>,
    pub gender: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub warehouse: Option<warehouse_profile::Model>,
    pub driver: Option<driver_profile::Model>,
}

impl AccountProfile {
    fn assemble(
        account: account::Model,
        warehouse: Option<warehouse_profile::Model>,
        driver: Option<driver_profile::Model>,
    ) -> Self {
        Self {
            id: account.id,
            role: account.role,
            name: account.name,
            email: account.email,
            phone: account.phone,
            dob: account.dob,
            gender: account.gender,
            is_active: account.is_active,
            created_at: account.created_at,
            warehouse,
            driver,
        }
    }

    /// `None` for roles without an approval gate.
    pub fn approved(&self) -> Option<bool> {
        match self.role {
            AccountRole::Warehouse => Some(self.warehouse.as_ref().map_or(false, |w| w.approved)),
            AccountRole::Driver => Some(self.driver.as_ref().map_or(false, |d| d.approved)),
            _ => None,
        }
    }
}

/// Registration, verification, login and account administration.
#[derive(Clone)]
pub struct IdentityService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    auth: Arc<AuthService>,
    windows: OtpWindows,
}

impl IdentityService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        auth: Arc<AuthService>,
        windows: OtpWindows,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            auth,
            windows,
        }
    }

    async fn find_by_phone<C: ConnectionTrait>(
        conn: &C,
        phone: &str,
    ) -> Result<Option<account::Model>, ServiceError> {
        Ok(account::Entity::find()
            .filter(account::Column::Phone.eq(phone.trim()))
            .one(conn)
            .await?)
    }

    fn new_account(
        request: &RegisterCustomerRequest,
        role: AccountRole,
        password_hash: String,
        is_active: bool,
    ) -> account::ActiveModel {
        let now = Utc::now();
        account::ActiveModel {
            id: Set(Uuid::new_v4()),
            role: Set(role),
            name: Set(request.name.trim().to_string()),
            email: Set(request.email.clone()),
            phone: Set(request.phone.trim().to_string()),
            password_hash: Set(password_hash),
            dob: Set(None),
            gender: Set(None),
            is_active: Set(is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }

    /// Replaces any live code for the same purpose.
    async fn issue_otp<C: ConnectionTrait>(
        conn: &C,
        account_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<String, ServiceError> {
        otp::Entity::delete_many()
            .filter(otp::Column::AccountId.eq(account_id))
            .filter(otp::Column::Purpose.eq(purpose))
            .exec(conn)
            .await?;

        let code = otp_codes::generate_code();
        otp::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id),
            purpose: Set(purpose),
            code: Set(code.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        Ok(code)
    }

    /// Finds the code by value, then rejects and deletes it when stale.
    async fn take_matching_otp(
        &self,
        account_id: Uuid,
        purpose: OtpPurpose,
        submitted: &str,
        window: std::time::Duration,
    ) -> Result<otp::Model, ServiceError> {
        let db = &*self.db_pool;
        let record = otp::Entity::find()
            .filter(otp::Column::AccountId.eq(account_id))
            .filter(otp::Column::Purpose.eq(purpose))
            .filter(otp::Column::Code.eq(submitted.trim()))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::InvalidOtp(INVALID_OTP.to_string()))?;

        if otp_codes::is_expired(record.created_at, Utc::now(), window) {
            otp::Entity::delete_by_id(record.id).exec(db).await?;
            warn!(account_id = %account_id, ?purpose, "expired OTP submitted");
            return Err(ServiceError::ExpiredCredential(
                "OTP has expired. Please request a new one.".to_string(),
            ));
        }

        Ok(record)
    }

    async fn ensure_phone_free<C: ConnectionTrait>(conn: &C, phone: &str) -> Result<(), ServiceError> {
        if Self::find_by_phone(conn, phone).await?.is_some() {
            return Err(ServiceError::Conflict(
                "An account with this phone number already exists".to_string(),
            ));
        }
        Ok(())
    }

    async fn announce_otp(&self, account_id: Uuid, purpose: OtpPurpose, code: String, resent: bool) {
        emit(
            &self.event_sender,
            Event::OtpIssued {
                account_id,
                purpose,
                code,
                resent,
            },
        )
        .await;
    }

    #[instrument(skip(self, request), fields(phone = %request.phone))]
    pub async fn register_customer(
        &self,
        request: RegisterCustomerRequest,
    ) -> Result<RegistrationResponse, ServiceError> {
        request.validate()?;
        let hash = password::hash_password(&request.password)?;

        let txn = self.db_pool.begin().await?;
        Self::ensure_phone_free(&txn, &request.phone).await?;
        let account = Self::new_account(&request, AccountRole::Customer, hash, false)
            .insert(&txn)
            .await?;
        let code = Self::issue_otp(&txn, account.id, OtpPurpose::Registration).await?;
        txn.commit().await?;

        info!(account_id = %account.id, "customer registered");
        self.announce_otp(account.id, OtpPurpose::Registration, code, false)
            .await;

        Ok(RegistrationResponse {
            account_id: account.id,
            role: account.role,
            phone: account.phone,
            warehouse_code: None,
        })
    }

    #[instrument(skip(self, request), fields(phone = %request.account.phone))]
    pub async fn register_warehouse(
        &self,
        request: RegisterWarehouseRequest,
    ) -> Result<RegistrationResponse, ServiceError> {
        request.validate()?;
        let hash = password::hash_password(&request.account.password)?;

        let txn = self.db_pool.begin().await?;
        Self::ensure_phone_free(&txn, &request.account.phone).await?;
        let account = Self::new_account(&request.account, AccountRole::Warehouse, hash, false)
            .insert(&txn)
            .await?;

        let warehouse_code = sequences::next_code(&txn, SequenceKind::Warehouse).await?;
        warehouse_profile::ActiveModel {
            account_id: Set(account.id),
            warehouse_code: Set(warehouse_code.clone()),
            warehouse_name: Set(request.warehouse_name.trim().to_string()),
            identity_type: Set(request.identity_type),
            gst_no: Set(request.gst_no.clone()),
            fssai_no: Set(request.fssai_no.clone()),
            operation_area: Set(request.operation_area.clone()),
            address: Set(request.address.clone()),
            latitude: Set(request.latitude),
            longitude: Set(request.longitude),
            approved: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let code = Self::issue_otp(&txn, account.id, OtpPurpose::Registration).await?;
        txn.commit().await?;

        info!(account_id = %account.id, warehouse_code = %warehouse_code, "warehouse registered");
        self.announce_otp(account.id, OtpPurpose::Registration, code, false)
            .await;

        Ok(RegistrationResponse {
            account_id: account.id,
            role: account.role,
            phone: account.phone,
            warehouse_code: Some(warehouse_code),
        })
    }

    #[instrument(skip(self, request), fields(phone = %request.account.phone, warehouse_id = %request.warehouse_id))]
    pub async fn register_driver(
        &self,
        request: RegisterDriverRequest,
    ) -> Result<RegistrationResponse, ServiceError> {
        request.validate()?;

        let db = &*self.db_pool;
        warehouse_profile::Entity::find_by_id(request.warehouse_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Warehouse not found".to_string()))?;

        let hash = password::hash_password(&request.account.password)?;

        let txn = db.begin().await?;
        Self::ensure_phone_free(&txn, &request.account.phone).await?;
        let account = Self::new_account(&request.account, AccountRole::Driver, hash, false)
            .insert(&txn)
            .await?;

        driver_profile::ActiveModel {
            account_id: Set(account.id),
            warehouse_id: Set(request.warehouse_id),
            address: Set(request.address.clone()),
            license_no: Set(request.license_no.clone()),
            aadhar_no: Set(request.aadhar_no.clone()),
            pan_no: Set(request.pan_no.clone()),
            vehicle_no: Set(request.vehicle_no.clone()),
            approved: Set(false),
            is_free: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let code = Self::issue_otp(&txn, account.id, OtpPurpose::Registration).await?;
        txn.commit().await?;

        info!(account_id = %account.id, "driver registered");
        self.announce_otp(account.id, OtpPurpose::Registration, code, false)
            .await;

        Ok(RegistrationResponse {
            account_id: account.id,
            role: account.role,
            phone: account.phone,
            warehouse_code: None,
        })
    }

    /// Activates the account. The code is single use.
    #[instrument(skip(self, request), fields(phone = %request.phone))]
    pub async fn verify_otp(&self, request: VerifyOtpRequest) -> Result<(), ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let account = Self::find_by_phone(db, &request.phone)
            .await?
            .ok_or_else(|| ServiceError::InvalidOtp(INVALID_OTP.to_string()))?;

        let record = self
            .take_matching_otp(
                account.id,
                OtpPurpose::Registration,
                &request.otp,
                self.windows.registration,
            )
            .await?;

        if account.is_active {
            return Err(ServiceError::InvalidStatus(ALREADY_VERIFIED.to_string()));
        }

        let txn = db.begin().await?;
        let account_id = account.id;
        let mut active: account::ActiveModel = account.into();
        active.is_active = Set(true);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        otp::Entity::delete_by_id(record.id).exec(&txn).await?;
        txn.commit().await?;

        info!(account_id = %account_id, "account verified");
        Ok(())
    }

    #[instrument(skip(self, request), fields(phone = %request.phone))]
    pub async fn resend_otp(&self, request: PhoneRequest) -> Result<(), ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let account = Self::find_by_phone(db, &request.phone)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        if account.is_active {
            return Err(ServiceError::InvalidStatus(ALREADY_VERIFIED.to_string()));
        }

        let code = Self::issue_otp(db, account.id, OtpPurpose::Registration).await?;
        info!(account_id = %account.id, "registration OTP resent");
        self.announce_otp(account.id, OtpPurpose::Registration, code, true)
            .await;
        Ok(())
    }

    #[instrument(skip(self, request), fields(phone = %request.phone))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let invalid = || ServiceError::Unauthorized("Invalid credentials".to_string());

        let account = Self::find_by_phone(db, &request.phone)
            .await?
            .ok_or_else(invalid)?;

        if !password::verify_password(&account.password_hash, &request.password)? {
            warn!(account_id = %account.id, "login rejected: bad password");
            return Err(invalid());
        }

        if !account.is_active {
            return Err(ServiceError::Forbidden("Account is not verified".to_string()));
        }

        let profile = self.load_profile(account).await?;
        if profile.approved() == Some(false) {
            return Err(ServiceError::Forbidden(
                "Account is pending approval".to_string(),
            ));
        }

        let tokens = self.issue_tokens_for(&profile)?;
        info!(account_id = %profile.id, role = %profile.role, "login succeeded");
        Ok(LoginResponse {
            tokens,
            account: profile,
        })
    }

    fn issue_tokens_for(&self, profile: &AccountProfile) -> Result<TokenPair, ServiceError> {
        let now = Utc::now();
        let model = account::Model {
            id: profile.id,
            role: profile.role,
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            password_hash: String::new(),
            dob: profile.dob,
            gender: profile.gender.clone(),
            is_active: profile.is_active,
            created_at: profile.created_at,
            updated_at: now,
        };
        Ok(self.auth.generate_token(&model)?)
    }

    #[instrument(skip(self, request))]
    pub async fn refresh(&self, request: RefreshRequest) -> Result<TokenPair, ServiceError> {
        request.validate()?;
        let account_id = self.auth.validate_refresh_token(&request.refresh_token)?;

        let account = account::Entity::find_by_id(account_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Invalid token".to_string()))?;

        if !account.is_active {
            return Err(ServiceError::Forbidden("Account is not verified".to_string()));
        }

        Ok(self.auth.generate_token(&account)?)
    }

    async fn load_profile(&self, account: account::Model) -> Result<AccountProfile, ServiceError> {
        let db = &*self.db_pool;
        let (warehouse, driver) = match account.role {
            AccountRole::Warehouse => (
                warehouse_profile::Entity::find_by_id(account.id).one(db).await?,
                None,
            ),
            AccountRole::Driver => (
                None,
                driver_profile::Entity::find_by_id(account.id).one(db).await?,
            ),
            _ => (None, None),
        };
        Ok(AccountProfile::assemble(account, warehouse, driver))
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, account_id: Uuid) -> Result<AccountProfile, ServiceError> {
        let account = account::Entity::find_by_id(account_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;
        self.load_profile(account).await
    }

    #[instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        account_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<AccountProfile, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let account = account::Entity::find_by_id(account_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;

        let mut active: account::ActiveModel = account.into();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(email) = request.email {
            active.email = Set(Some(email));
        }
        if let Some(dob) = request.dob {
            active.dob = Set(Some(dob));
        }
        if let Some(gender) = request.gender {
            active.gender = Set(Some(gender));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        info!(account_id = %account_id, "profile updated");
        self.load_profile(updated).await
    }

    #[instrument(skip(self, request), fields(phone = %request.phone))]
    pub async fn request_password_reset(&self, request: PhoneRequest) -> Result<(), ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let account = Self::find_by_phone(db, &request.phone)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let code = Self::issue_otp(db, account.id, OtpPurpose::PasswordReset).await?;
        info!(account_id = %account.id, "password reset OTP issued");
        self.announce_otp(account.id, OtpPurpose::PasswordReset, code, false)
            .await;
        Ok(())
    }

    /// Trades a valid reset OTP for a one-time reset token. Earlier unused
    /// tokens are invalidated.
    #[instrument(skip(self, request), fields(phone = %request.phone))]
    pub async fn verify_password_reset(
        &self,
        request: VerifyOtpRequest,
    ) -> Result<PasswordResetTokenResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let account = Self::find_by_phone(db, &request.phone)
            .await?
            .ok_or_else(|| ServiceError::InvalidOtp(INVALID_OTP.to_string()))?;

        let record = self
            .take_matching_otp(
                account.id,
                OtpPurpose::PasswordReset,
                &request.otp,
                self.windows.password_reset,
            )
            .await?;

        let (token, token_hash) = password::generate_reset_token();
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(self.windows.password_reset_token)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        let txn = db.begin().await?;
        otp::Entity::delete_by_id(record.id).exec(&txn).await?;
        password_reset_token::Entity::update_many()
            .col_expr(
                password_reset_token::Column::Used,
                sea_orm::sea_query::Expr::value(true),
            )
            .filter(password_reset_token::Column::AccountId.eq(account.id))
            .filter(password_reset_token::Column::Used.eq(false))
            .exec(&txn)
            .await?;
        password_reset_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account.id),
            token_hash: Set(token_hash),
            expires_at: Set(expires_at),
            used: Set(false),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(account_id = %account.id, "password reset token issued");
        Ok(PasswordResetTokenResponse {
            reset_token: token,
            expires_at,
        })
    }

    #[instrument(skip(self, request), fields(phone = %request.phone))]
    pub async fn confirm_password_reset(
        &self,
        request: PasswordResetConfirmRequest,
    ) -> Result<(), ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let invalid = || ServiceError::ValidationError("Invalid reset token".to_string());

        let account = Self::find_by_phone(db, &request.phone)
            .await?
            .ok_or_else(invalid)?;

        let record = password_reset_token::Entity::find()
            .filter(password_reset_token::Column::AccountId.eq(account.id))
            .filter(
                password_reset_token::Column::TokenHash
                    .eq(password::hash_reset_token(request.token.trim())),
            )
            .one(db)
            .await?
            .ok_or_else(invalid)?;

        let hash = password::hash_password(&request.new_password)?;

        let txn = db.begin().await?;
        // the token is spent by whichever confirm flips `used` first
        let claimed = password_reset_token::Entity::update_many()
            .col_expr(
                password_reset_token::Column::Used,
                sea_orm::sea_query::Expr::value(true),
            )
            .filter(password_reset_token::Column::Id.eq(record.id))
            .filter(password_reset_token::Column::Used.eq(false))
            .exec(&txn)
            .await?;
        if claimed.rows_affected != 1 {
            return Err(invalid());
        }
        if record.expires_at < Utc::now() {
            return Err(ServiceError::ExpiredCredential(
                "Reset token has expired".to_string(),
            ));
        }

        let account_id = account.id;
        let mut active: account::ActiveModel = account.into();
        active.password_hash = Set(hash);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;

        info!(account_id = %account_id, "password reset completed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn approve_warehouse(&self, account_id: Uuid) -> Result<AccountProfile, ServiceError> {
        let db = &*self.db_pool;
        let profile = warehouse_profile::Entity::find_by_id(account_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Warehouse not found".to_string()))?;

        let mut active: warehouse_profile::ActiveModel = profile.into();
        active.approved = Set(true);
        active.update(db).await?;

        info!(account_id = %account_id, "warehouse approved");
        emit(
            &self.event_sender,
            Event::AccountApproved {
                account_id,
                role: AccountRole::Warehouse,
            },
        )
        .await;
        self.get_profile(account_id).await
    }

    #[instrument(skip(self))]
    pub async fn approve_driver(&self, account_id: Uuid) -> Result<AccountProfile, ServiceError> {
        let db = &*self.db_pool;
        let profile = driver_profile::Entity::find_by_id(account_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Driver not found".to_string()))?;

        let mut active: driver_profile::ActiveModel = profile.into();
        active.approved = Set(true);
        active.update(db).await?;

        info!(account_id = %account_id, "driver approved");
        emit(
            &self.event_sender,
            Event::AccountApproved {
                account_id,
                role: AccountRole::Driver,
            },
        )
        .await;
        self.get_profile(account_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_accounts(
        &self,
        role: Option<AccountRole>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<AccountProfile>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query = account::Entity::find().order_by_desc(account::Column::CreatedAt);
        if let Some(role) = role {
            query = query.filter(account::Column::Role.eq(role));
        }
        let paginator = query.paginate(db, limit);
        let total = paginator.num_items().await?;
        let accounts = paginator.fetch_page(page.saturating_sub(1)).await?;

        let ids: Vec<Uuid> = accounts.iter().map(|a| a.id).collect();
        let mut warehouses: HashMap<Uuid, warehouse_profile::Model> =
            warehouse_profile::Entity::find()
                .filter(warehouse_profile::Column::AccountId.is_in(ids.clone()))
                .all(db)
                .await?
                .into_iter()
                .map(|w| (w.account_id, w))
                .collect();
        let mut drivers: HashMap<Uuid, driver_profile::Model> = driver_profile::Entity::find()
            .filter(driver_profile::Column::AccountId.is_in(ids))
            .all(db)
            .await?
            .into_iter()
            .map(|d| (d.account_id, d))
            .collect();

        let items = accounts
            .into_iter()
            .map(|a| {
                let id = a.id;
                AccountProfile::assemble(a, warehouses.remove(&id), drivers.remove(&id))
            })
            .collect();
        Ok((items, total))
    }

    /// Creates an active admin unless the phone is already taken.
    #[instrument(skip(self, password))]
    pub async fn ensure_admin(
        &self,
        name: &str,
        phone: &str,
        password: &str,
    ) -> Result<account::Model, ServiceError> {
        let db = &*self.db_pool;
        if let Some(existing) = Self::find_by_phone(db, phone).await? {
            if existing.role != AccountRole::Admin {
                error!(phone = %phone, "bootstrap admin phone belongs to a non-admin account");
                return Err(ServiceError::Conflict(
                    "Phone is registered to a non-admin account".to_string(),
                ));
            }
            return Ok(existing);
        }

        let request = RegisterCustomerRequest {
            name: name.to_string(),
            phone: phone.to_string(),
            email: None,
            password: password.to_string(),
        };
        request.validate()?;
        let hash = password::hash_password(password)?;
        let admin = Self::new_account(&request, AccountRole::Admin, hash, true)
            .insert(db)
            .await?;
        info!(account_id = %admin.id, "admin account created");
        Ok(admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use assert_matches::assert_matches;
    use std::time::Duration;

    async fn service() -> IdentityService {
        let pool = Arc::new(crate::db::migrated_memory_pool().await);
        let auth = Arc::new(AuthService::new(AuthConfig::new(
            "test_secret_key_for_testing_purposes_only_32chars".into(),
            "quickcommerce-api".into(),
            "quickcommerce-auth".into(),
            Duration::from_secs(600),
            Duration::from_secs(3600),
        )));
        IdentityService::new(pool, None, auth, OtpWindows::default())
    }

    fn customer(phone: &str) -> RegisterCustomerRequest {
        RegisterCustomerRequest {
            name: "Meera".into(),
            phone: phone.into(),
            email: Some("meera@example.com".into()),
            password: "correct-horse".into(),
        }
    }

    async fn stored_otp(svc: &IdentityService, account_id: Uuid, purpose: OtpPurpose) -> otp::Model {
        otp::Entity::find()
            .filter(otp::Column::AccountId.eq(account_id))
            .filter(otp::Column::Purpose.eq(purpose))
            .one(&*svc.db_pool)
            .await
            .unwrap()
            .expect("otp row")
    }

    #[test]
    fn phone_format_is_enforced() {
        assert!(customer("+919812345678").validate().is_ok());
        assert!(customer("9812345678").validate().is_err());
        assert!(customer("+123456789012345").validate().is_err());
    }

    #[test]
    fn driver_identity_numbers_are_checked() {
        let mut req = RegisterDriverRequest {
            account: customer("+919800000009"),
            warehouse_id: Uuid::new_v4(),
            address: "12 MG Road".into(),
            license_no: "DL-0420110149646".into(),
            aadhar_no: "123412341234".into(),
            pan_no: Some("ABCDE1234F".into()),
            vehicle_no: "KA01AB1234".into(),
        };
        assert!(req.validate().is_ok());
        req.aadhar_no = "1234".into();
        assert!(req.validate().is_err());
        req.aadhar_no = "123412341234".into();
        req.pan_no = Some("abcde1234f".into());
        assert!(req.validate().is_err());
    }

    #[tokio::test]
    async fn duplicate_phone_is_a_conflict() {
        let svc = service().await;
        svc.register_customer(customer("+919811111111")).await.unwrap();
        assert_matches!(
            svc.register_customer(customer("+919811111111")).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn verify_activates_once_and_consumes_code() {
        let svc = service().await;
        let reg = svc.register_customer(customer("+919822222222")).await.unwrap();
        let code = stored_otp(&svc, reg.account_id, OtpPurpose::Registration).await.code;

        svc.verify_otp(VerifyOtpRequest {
            phone: "+919822222222".into(),
            otp: code.clone(),
        })
        .await
        .unwrap();

        let acct = account::Entity::find_by_id(reg.account_id)
            .one(&*svc.db_pool)
            .await
            .unwrap()
            .unwrap();
        assert!(acct.is_active);

        // single use
        assert_matches!(
            svc.verify_otp(VerifyOtpRequest {
                phone: "+919822222222".into(),
                otp: code,
            })
            .await,
            Err(ServiceError::InvalidOtp(_))
        );
    }

    #[tokio::test]
    async fn stale_registration_code_is_expired_and_deleted() {
        let svc = service().await;
        let reg = svc.register_customer(customer("+919833333333")).await.unwrap();
        let record = stored_otp(&svc, reg.account_id, OtpPurpose::Registration).await;
        let code = record.code.clone();

        let mut stale: otp::ActiveModel = record.into();
        stale.created_at = Set(Utc::now() - chrono::Duration::minutes(11));
        stale.update(&*svc.db_pool).await.unwrap();

        assert_matches!(
            svc.verify_otp(VerifyOtpRequest {
                phone: "+919833333333".into(),
                otp: code.clone(),
            })
            .await,
            Err(ServiceError::ExpiredCredential(_))
        );
        // deleted, so the same code is now simply invalid
        assert_matches!(
            svc.verify_otp(VerifyOtpRequest {
                phone: "+919833333333".into(),
                otp: code,
            })
            .await,
            Err(ServiceError::InvalidOtp(_))
        );
    }

    #[tokio::test]
    async fn login_gates_on_verification_then_approval() {
        let svc = service().await;
        let admin = svc
            .ensure_admin("Ops", "+919800000000", "admin-password")
            .await
            .unwrap();
        assert!(admin.is_active);

        let wh = svc
            .register_warehouse(RegisterWarehouseRequest {
                account: customer("+919844444444"),
                warehouse_name: "Fresh Mart".into(),
                identity_type: IdentityType::PanCard,
                gst_no: Some("22AAAAA0000A1Z5".into()),
                fssai_no: None,
                operation_area: "Indiranagar".into(),
                address: "100ft Road".into(),
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap();
        assert_eq!(wh.warehouse_code.as_deref(), Some("WH0001"));

        let login = || LoginRequest {
            phone: "+919844444444".into(),
            password: "correct-horse".into(),
        };

        assert_matches!(svc.login(login()).await, Err(ServiceError::Forbidden(m)) if m.contains("not verified"));

        let code = stored_otp(&svc, wh.account_id, OtpPurpose::Registration).await.code;
        svc.verify_otp(VerifyOtpRequest {
            phone: "+919844444444".into(),
            otp: code,
        })
        .await
        .unwrap();
        assert_matches!(svc.login(login()).await, Err(ServiceError::Forbidden(m)) if m.contains("pending approval"));

        svc.approve_warehouse(wh.account_id).await.unwrap();
        let ok = svc.login(login()).await.unwrap();
        assert_eq!(ok.account.role, AccountRole::Warehouse);
        assert!(!ok.tokens.access_token.is_empty());

        assert_matches!(
            svc.login(LoginRequest {
                phone: "+919844444444".into(),
                password: "wrong-password".into(),
            })
            .await,
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[tokio::test]
    async fn password_reset_flow_replaces_password_once() {
        let svc = service().await;
        svc.ensure_admin("Ops", "+919855555555", "old-password").await.unwrap();

        svc.request_password_reset(PhoneRequest {
            phone: "+919855555555".into(),
        })
        .await
        .unwrap();
        let acct = IdentityService::find_by_phone(&*svc.db_pool, "+919855555555")
            .await
            .unwrap()
            .unwrap();
        let code = stored_otp(&svc, acct.id, OtpPurpose::PasswordReset).await.code;

        let issued = svc
            .verify_password_reset(VerifyOtpRequest {
                phone: "+919855555555".into(),
                otp: code,
            })
            .await
            .unwrap();

        let confirm = || PasswordResetConfirmRequest {
            phone: "+919855555555".into(),
            token: issued.reset_token.clone(),
            new_password: "new-password".into(),
        };
        let (first, second) = tokio::join!(
            svc.confirm_password_reset(confirm()),
            svc.confirm_password_reset(PasswordResetConfirmRequest {
                new_password: "other-password".into(),
                ..confirm()
            }),
        );
        // exactly one of the racing confirms spends the token
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(ServiceError::ValidationError(_)))));
        let winner = if outcomes[0].is_ok() { "new-password" } else { "other-password" };
        assert_matches!(
            svc.confirm_password_reset(confirm()).await,
            Err(ServiceError::ValidationError(_))
        );

        assert!(svc
            .login(LoginRequest {
                phone: "+919855555555".into(),
                password: winner.into(),
            })
            .await
            .is_ok());
    }
}
