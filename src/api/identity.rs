/// Registration, email verification, login and password reset
use crate::{
    api::extract::ApiJson,
    account::{
        AccountResponse, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
        VerifyEmailRequest,
    },
    auth::{clear_session_cookie, set_session_cookie, AuthUser},
    context::AppContext,
    error::ApiResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;

/// Build identity routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", post(reset_password))
        .route("/auth/check-auth", get(check_auth))
        .route("/auth/me", get(me))
}

/// Create an account, mail its verification code and open a session
async fn signup(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    ApiJson(req): ApiJson<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!("signup: registering {}", req.username.trim());

    let record = ctx.account_manager.register(&req).await?;
    let profile_url = ctx.profile_url(&record.username);

    if let Some(code) = record.verification_token.as_deref() {
        ctx.mailer.dispatch(ctx.mailer.verification_email(
            &record.email,
            &record.name,
            code,
            &profile_url,
        ));
    }
    ctx.mailer
        .dispatch(ctx.mailer.welcome_email(&record.email, &record.name, &profile_url));

    let jar = set_session_cookie(jar, &ctx, &record.id)?;
    let user = ctx.account_manager.to_user(record).await?;

    Ok((
        StatusCode::CREATED,
        jar,
        Json(AccountResponse {
            success: true,
            message: "User created successfully".to_string(),
            user,
        }),
    ))
}

async fn verify_email(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<VerifyEmailRequest>,
) -> ApiResult<Json<AccountResponse>> {
    let record = ctx.account_manager.verify_email(&req.code).await?;

    let profile_url = ctx.profile_url(&record.username);
    ctx.mailer
        .dispatch(ctx.mailer.welcome_email(&record.email, &record.name, &profile_url));

    Ok(Json(AccountResponse {
        success: true,
        message: "Email verified successfully".to_string(),
        user: ctx.account_manager.to_user(record).await?,
    }))
}

async fn login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let record = ctx.account_manager.login(&req.identifier, &req.password).await?;
    tracing::info!("login: {} signed in", record.username);

    let jar = set_session_cookie(jar, &ctx, &record.id)?;
    let user = ctx.account_manager.to_user(record).await?;

    Ok((
        jar,
        Json(AccountResponse {
            success: true,
            message: "Logged in successfully".to_string(),
            user,
        }),
    ))
}

async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        clear_session_cookie(jar),
        Json(json!({ "success": true, "message": "Logged out successfully" })),
    )
}

async fn forgot_password(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (record, token) = ctx.account_manager.request_password_reset(&req.email).await?;

    let reset_url = ctx.client_link(&format!("reset-password/{}", token));
    ctx.mailer
        .dispatch(ctx.mailer.password_reset_email(&record.email, &record.name, &reset_url));

    Ok(Json(json!({
        "success": true,
        "message": "Password reset link sent to your email"
    })))
}

async fn reset_password(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let record = ctx.account_manager.reset_password(&token, &req.password).await?;

    ctx.mailer
        .dispatch(ctx.mailer.password_reset_success_email(&record.email, &record.name));

    Ok(Json(json!({
        "success": true,
        "message": "Password reset successful"
    })))
}

async fn check_auth(State(ctx): State<AppContext>, auth: AuthUser) -> ApiResult<Json<serde_json::Value>> {
    let user = ctx.account_manager.to_user(auth.user).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

async fn me(State(ctx): State<AppContext>, auth: AuthUser) -> ApiResult<Json<crate::account::User>> {
    Ok(Json(ctx.account_manager.to_user(auth.user).await?))
}
