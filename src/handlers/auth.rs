use axum::{extract::State, http::StatusCode, Json};

use crate::auth::{AuthUser, TokenPair};
use crate::errors::ServiceError;
use crate::handlers::MessageResponse;
use crate::services::identity::{
    AccountProfile, LoginRequest, LoginResponse, PasswordResetConfirmRequest,
    PasswordResetTokenResponse, PhoneRequest, RefreshRequest, RegisterCustomerRequest,
    RegisterDriverRequest, RegisterWarehouseRequest, RegistrationResponse, UpdateProfileRequest,
    VerifyOtpRequest,
};
use crate::{ApiResponse, ApiResult, AppState};

type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>), ServiceError>;

fn created<T>(data: T, message: &str) -> Created<T> {
    let mut body = ApiResponse::success(data);
    body.message = Some(message.to_string());
    Ok((StatusCode::CREATED, Json(body)))
}

const OTP_SENT: &str = "Registration successful. An OTP has been sent to your phone.";

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    summary = "Register a customer",
    request_body = RegisterCustomerRequest,
    responses(
        (status = 201, description = "Account created; OTP issued", body = ApiResponse<RegistrationResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 409, description = "Phone already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register_customer(
    State(state): State<AppState>,
    Json(request): Json<RegisterCustomerRequest>,
) -> Created<RegistrationResponse> {
    let registered = state.services.identity.register_customer(request).await?;
    created(registered, OTP_SENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register/warehouse",
    summary = "Register a warehouse",
    request_body = RegisterWarehouseRequest,
    responses(
        (status = 201, description = "Account created; awaiting OTP and approval", body = ApiResponse<RegistrationResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 409, description = "Phone already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register_warehouse(
    State(state): State<AppState>,
    Json(request): Json<RegisterWarehouseRequest>,
) -> Created<RegistrationResponse> {
    let registered = state.services.identity.register_warehouse(request).await?;
    created(registered, OTP_SENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register/driver",
    summary = "Register a driver",
    request_body = RegisterDriverRequest,
    responses(
        (status = 201, description = "Account created; awaiting OTP and approval", body = ApiResponse<RegistrationResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 404, description = "Warehouse not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Phone already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register_driver(
    State(state): State<AppState>,
    Json(request): Json<RegisterDriverRequest>,
) -> Created<RegistrationResponse> {
    let registered = state.services.identity.register_driver(request).await?;
    created(registered, OTP_SENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-otp",
    summary = "Verify registration OTP",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Account activated", body = ApiResponse<MessageResponse>),
        (status = 400, description = "Invalid, expired or already used OTP", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> ApiResult<MessageResponse> {
    state.services.identity.verify_otp(request).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Account verified successfully.",
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/resend-otp",
    summary = "Resend registration OTP",
    request_body = PhoneRequest,
    responses(
        (status = 200, description = "OTP resent", body = ApiResponse<MessageResponse>),
        (status = 400, description = "Account already verified", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown phone", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(request): Json<PhoneRequest>,
) -> ApiResult<MessageResponse> {
    state.services.identity.resend_otp(request).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "A new OTP has been sent to your phone.",
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    summary = "Log in with phone and password",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair and profile", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not verified or pending approval", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let session = state.services.identity.login(request).await?;
    Ok(Json(ApiResponse::success(session)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    summary = "Exchange a refresh token",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = ApiResponse<TokenPair>),
        (status = 401, description = "Invalid refresh token", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<TokenPair> {
    let tokens = state.services.identity.refresh(request).await?;
    Ok(Json(ApiResponse::success(tokens)))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/profile",
    summary = "Current account profile",
    responses(
        (status = 200, description = "Profile", body = ApiResponse<AccountProfile>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<AccountProfile> {
    let profile = state.services.identity.get_profile(user.user_id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/auth/profile",
    summary = "Update name, email, date of birth or gender",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = ApiResponse<AccountProfile>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<AccountProfile> {
    let profile = state
        .services
        .identity
        .update_profile(user.user_id, request)
        .await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset",
    summary = "Request a password reset OTP",
    request_body = PhoneRequest,
    responses(
        (status = 200, description = "OTP sent", body = ApiResponse<MessageResponse>),
        (status = 404, description = "Unknown phone", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PhoneRequest>,
) -> ApiResult<MessageResponse> {
    state.services.identity.request_password_reset(request).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "A password reset OTP has been sent to your phone.",
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/verify",
    summary = "Exchange a reset OTP for a reset token",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "One-time reset token", body = ApiResponse<PasswordResetTokenResponse>),
        (status = 400, description = "Invalid or expired OTP", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_password_reset(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> ApiResult<PasswordResetTokenResponse> {
    let token = state.services.identity.verify_password_reset(request).await?;
    Ok(Json(ApiResponse::success(token)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/confirm",
    summary = "Set a new password with a reset token",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password changed", body = ApiResponse<MessageResponse>),
        (status = 400, description = "Invalid, used or expired token", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> ApiResult<MessageResponse> {
    state.services.identity.confirm_password_reset(request).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password has been reset.",
    ))))
}
