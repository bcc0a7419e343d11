//! HTTP surface
//!
//! Thin axum layer over the cart service, checkout engine and order store.
//! Identity arrives from the gateway as `x-user-id` / `x-user-role` headers;
//! token issuance and verification live upstream.

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::carts::{CartService, CartView};
use crate::checkout::{CheckoutEngine, CheckoutReceipt, CheckoutRequest};
use crate::domain::aggregates::order::OrderLine;
use crate::domain::aggregates::Order;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Address, Money, OrderStatus, PaymentMethod, PaymentStatus};
use crate::notify::NotificationSink;
use crate::storage::{DailySales, MethodRevenue, OrderStore};
use crate::AppError;

#[derive(Clone)]
pub struct AppState {
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutEngine>,
    pub orders: Arc<dyn OrderStore>,
    pub sink: Arc<dyn NotificationSink>,
}

// =============================================================================
// Identity
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Customer,
    Admin,
}

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(AppError::Unauthenticated)?;
        let role = match parts.headers.get("x-user-role").and_then(|v| v.to_str().ok()) {
            Some("admin") => Role::Admin,
            _ => Role::Customer,
        };
        Ok(AuthUser { id, role })
    }
}

// =============================================================================
// Error mapping
// =============================================================================

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) | AppError::EmptyCart => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DataIntegrity(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Dependency(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Infrastructure detail stays in the log, not the response body.
        let message = match &self {
            AppError::Storage(inner) | AppError::Dependency(inner) => {
                tracing::error!(error = %inner, "request failed");
                "Internal server error.".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub items: Vec<OrderLine>,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub notes: Option<String>,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            items: order.items().to_vec(),
            shipping_address: order.shipping_address().clone(),
            payment_method: order.payment_method(),
            payment_status: order.payment_status(),
            order_status: order.order_status(),
            notes: order.notes().map(str::to_string),
            subtotal: order.subtotal().clone(),
            tax: order.tax().clone(),
            shipping_cost: order.shipping_cost().clone(),
            total: order.total().clone(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecentOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AdminSummary {
    pub total_revenue: Decimal,
    pub total_orders: u64,
    pub recent_orders: Vec<RecentOrder>,
    pub sales_by_day: Vec<DailySales>,
    pub revenue_by_payment_method: Vec<MethodRevenue>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "farmgate-commerce"}))
}

async fn get_cart(State(s): State<AppState>, user: AuthUser) -> Result<Json<CartView>, AppError> {
    Ok(Json(s.carts.view(user.id).await?))
}

async fn add_to_cart(
    State(s): State<AppState>,
    user: AuthUser,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartView>, AppError> {
    req.validate().map_err(|e| AppError::InvalidInput(e.to_string()))?;
    Ok(Json(s.carts.add_item(user.id, req.product_id, req.quantity).await?))
}

async fn update_cart_item(
    State(s): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CartView>, AppError> {
    req.validate().map_err(|e| AppError::InvalidInput(e.to_string()))?;
    Ok(Json(s.carts.update_quantity(user.id, item_id, req.quantity).await?))
}

async fn remove_cart_item(
    State(s): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<CartView>, AppError> {
    Ok(Json(s.carts.remove_line(user.id, item_id).await?))
}

async fn clear_cart(State(s): State<AppState>, user: AuthUser) -> Result<Json<CartView>, AppError> {
    Ok(Json(s.carts.clear(user.id).await?))
}

async fn checkout(
    State(s): State<AppState>,
    user: AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>), AppError> {
    let receipt = s.checkout.checkout(user.id, req).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn list_orders(
    State(s): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = s.orders.find_for_user(user.id).await?;
    if orders.is_empty() {
        return Err(AppError::NotFound("Orders"));
    }
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

async fn get_order(
    State(s): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = s
        .orders
        .find_by_id(order_id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    // Not-found and not-owned are indistinguishable to the caller.
    if order.user_id() != user.id && user.role != Role::Admin {
        return Err(AppError::NotFound("Order"));
    }
    Ok(Json(OrderResponse::from(&order)))
}

async fn update_order_status(
    State(s): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    user.require_admin()?;
    let status = OrderStatus::parse(&req.status)?;
    let order = s
        .orders
        .update_order_status(order_id, status)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    if let Err(err) = s.sink.publish(&OrderEvent::status_changed(order_id, status)).await {
        tracing::warn!(order_id = %order_id, error = %err, "status notification failed");
    }
    Ok(Json(OrderResponse::from(&order)))
}

async fn admin_summary(
    State(s): State<AppState>,
    user: AuthUser,
    Query(params): Query<SummaryParams>,
) -> Result<Json<AdminSummary>, AppError> {
    user.require_admin()?;
    let (start, end) = summary_window(&params)?;

    let total_revenue = s.orders.revenue_total().await?;
    let total_orders = s.orders.count().await?;
    let recent_orders = s
        .orders
        .recent(5)
        .await?
        .iter()
        .map(|o| RecentOrder {
            id: o.id(),
            user_id: o.user_id(),
            total: o.total().clone(),
            status: o.order_status(),
            created_at: o.created_at(),
        })
        .collect();
    let sales_by_day = s.orders.sales_by_day(start, end).await?;
    let revenue_by_payment_method = s.orders.revenue_by_payment_method().await?;

    Ok(Json(AdminSummary {
        total_revenue,
        total_orders,
        recent_orders,
        sales_by_day,
        revenue_by_payment_method,
    }))
}

/// Date window for the sales series: `range=week|month`, or explicit
/// `start`/`end` dates, defaulting to the trailing week.
fn summary_window(params: &SummaryParams) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let parse_date = |value: &str| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| AppError::InvalidInput(format!("Invalid date '{value}'.")))
    };
    let end = match &params.end {
        Some(value) => {
            parse_date(value)?.and_time(NaiveTime::MIN).and_utc() + Duration::days(1)
                - Duration::seconds(1)
        }
        None => Utc::now(),
    };
    let start = match (params.range.as_deref(), &params.start) {
        (Some("month"), _) => Utc::now() - Duration::days(29),
        (Some("week"), _) => Utc::now() - Duration::days(6),
        (_, Some(value)) => parse_date(value)?.and_time(NaiveTime::MIN).and_utc(),
        _ => Utc::now() - Duration::days(6),
    };
    Ok((start, end))
}

// =============================================================================
// Router
// =============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/cart", get(get_cart))
        .route("/api/v1/cart/add", post(add_to_cart))
        .route("/api/v1/cart/items/:item_id", put(update_cart_item).delete(remove_cart_item))
        .route("/api/v1/cart/clear", delete(clear_cart))
        .route("/api/v1/cart/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:order_id", get(get_order))
        .route("/api/v1/admin/orders/:order_id/status", patch(update_order_status))
        .route("/api/v1/admin/summary", get(admin_summary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
