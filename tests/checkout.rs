//! Integration tests for cart mutation and the checkout transition, run
//! against the in-memory stores.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use farmgate_commerce::carts::CartService;
use farmgate_commerce::checkout::{AddressInput, CheckoutEngine, CheckoutRequest, UserLocks};
use farmgate_commerce::domain::events::OrderEvent;
use farmgate_commerce::domain::pricing::StandardPricing;
use farmgate_commerce::domain::value_objects::{Money, OrderStatus, PaymentStatus};
use farmgate_commerce::notify::RecordingSink;
use farmgate_commerce::storage::memory::{MemoryCartStore, MemoryCatalog, MemoryOrderStore};
use farmgate_commerce::storage::{CartStore, OrderStore, ProductSnapshot};
use farmgate_commerce::AppError;

struct Harness {
    carts: Arc<MemoryCartStore>,
    orders: Arc<MemoryOrderStore>,
    catalog: Arc<MemoryCatalog>,
    sink: RecordingSink,
    cart_service: CartService,
    engine: CheckoutEngine,
}

fn harness() -> Harness {
    let carts = Arc::new(MemoryCartStore::new());
    let orders = Arc::new(MemoryOrderStore::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let sink = RecordingSink::new();
    let locks = Arc::new(UserLocks::new());
    let pricing = Arc::new(StandardPricing);
    let cart_service = CartService::new(
        carts.clone(),
        catalog.clone(),
        pricing.clone(),
        locks.clone(),
        "GHS",
    );
    let engine = CheckoutEngine::new(
        carts.clone(),
        orders.clone(),
        catalog.clone(),
        pricing,
        Arc::new(sink.clone()),
        locks,
    );
    Harness { carts, orders, catalog, sink, cart_service, engine }
}

async fn seed_product(h: &Harness, name: &str, price_minor: i64) -> Uuid {
    let id = Uuid::new_v4();
    h.catalog
        .put(ProductSnapshot {
            id,
            name: name.to_string(),
            price: Money::new(Decimal::new(price_minor, 2), "GHS"),
        })
        .await;
    id
}

fn address() -> AddressInput {
    AddressInput {
        street: "12 Ridge Rd".into(),
        town: "Accra".into(),
        region: "Greater Accra".into(),
        digital_address: "GA-183-8164".into(),
        phone: "+233201234567".into(),
        country: "Ghana".into(),
    }
}

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: address(),
        payment_method: "mobile_money".into(),
        notes: None,
    }
}

mod cart_operations {
    use super::*;

    #[tokio::test]
    async fn add_merges_and_totals_follow() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;

        let view = h.cart_service.add_item(user, eggs, 2).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.totals.subtotal.amount(), Decimal::new(2000, 2));

        let view = h.cart_service.add_item(user, eggs, 1).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].quantity, 3);
        assert_eq!(view.totals.subtotal.amount(), Decimal::new(3000, 2));
    }

    #[tokio::test]
    async fn add_unknown_product_is_not_found() {
        let h = harness();
        let err = h
            .cart_service
            .add_item(Uuid::new_v4(), Uuid::new_v4(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("Product")));
    }

    #[tokio::test]
    async fn update_quantity_on_missing_line_leaves_cart_unchanged() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 2).await.unwrap();

        let err = h
            .cart_service
            .update_quantity(user, Uuid::new_v4(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let view = h.cart_service.view(user).await.unwrap();
        assert_eq!(view.items[0].quantity, 2);
    }

    #[tokio::test]
    async fn zero_quantity_is_invalid() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        let err = h.cart_service.add_item(user, eggs, 0).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn remove_of_absent_line_is_not_an_error() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 1).await.unwrap();

        let view = h.cart_service.remove_line(user, Uuid::new_v4()).await.unwrap();
        assert_eq!(view.items.len(), 1);
    }

    #[tokio::test]
    async fn clear_twice_is_idempotent() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 3).await.unwrap();

        let view = h.cart_service.clear(user).await.unwrap();
        assert!(view.items.is_empty());
        assert!(view.totals.total.amount().is_zero());
        let view = h.cart_service.clear(user).await.unwrap();
        assert!(view.items.is_empty());
    }

    #[tokio::test]
    async fn clear_without_cart_is_not_found() {
        let h = harness();
        let err = h.cart_service.clear(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("Cart")));
    }
}

mod checkout_transition {
    use super::*;

    #[tokio::test]
    async fn empty_cart_fails_and_creates_nothing() {
        let h = harness();
        let user = Uuid::new_v4();

        let err = h.engine.checkout(user, checkout_request()).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyCart));

        // Same outcome once a cart exists but is empty.
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 1).await.unwrap();
        h.cart_service.clear(user).await.unwrap();
        let err = h.engine.checkout(user, checkout_request()).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyCart));
        assert_eq!(h.orders.order_count().await, 0);
    }

    #[tokio::test]
    async fn totals_and_statuses_on_the_created_order() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        let feed = seed_product(&h, "Starter feed", 500).await;
        h.cart_service.add_item(user, eggs, 2).await.unwrap();
        h.cart_service.add_item(user, feed, 1).await.unwrap();

        let receipt = h.engine.checkout(user, checkout_request()).await.unwrap();
        assert_eq!(receipt.total.amount(), Decimal::new(3099, 2));
        assert_eq!(receipt.status, OrderStatus::Processing);
        assert_eq!(receipt.items.len(), 2);

        let order = h.orders.find_by_id(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.subtotal().amount(), Decimal::new(2500, 2));
        assert_eq!(order.tax().amount(), Decimal::ZERO);
        assert_eq!(order.shipping_cost().amount(), Decimal::new(599, 2));
        assert_eq!(order.total().amount(), Decimal::new(3099, 2));
        assert_eq!(order.payment_status(), PaymentStatus::Pending);

        // Cart is left empty and reusable.
        let view = h.cart_service.view(user).await.unwrap();
        assert!(view.items.is_empty());

        // One created event reached the sink.
        let events = h.sink.events().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], OrderEvent::Created { .. }));
    }

    #[tokio::test]
    async fn order_charges_the_snapshot_price_not_the_current_one() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 2).await.unwrap();

        // Catalog repricing after the add must not leak into the order.
        h.catalog
            .put(ProductSnapshot {
                id: eggs,
                name: "Tray of eggs".into(),
                price: Money::new(Decimal::new(9999, 2), "GHS"),
            })
            .await;

        let receipt = h.engine.checkout(user, checkout_request()).await.unwrap();
        let order = h.orders.find_by_id(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.items()[0].price_at_purchase.amount(), Decimal::new(1000, 2));
        assert_eq!(order.subtotal().amount(), Decimal::new(2000, 2));
    }

    #[tokio::test]
    async fn vanished_product_aborts_whole_checkout() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        let feed = seed_product(&h, "Starter feed", 500).await;
        h.cart_service.add_item(user, eggs, 1).await.unwrap();
        h.cart_service.add_item(user, feed, 1).await.unwrap();

        h.catalog.remove(feed).await;

        let err = h.engine.checkout(user, checkout_request()).await.unwrap_err();
        assert!(matches!(err, AppError::DataIntegrity(_)));
        assert_eq!(h.orders.order_count().await, 0);

        // No partial commit: the cart still has both lines.
        let view = h.cart_service.view(user).await.unwrap();
        assert_eq!(view.items.len(), 2);
    }

    #[tokio::test]
    async fn bad_payment_method_and_address_are_rejected_before_any_write() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 1).await.unwrap();

        let mut req = checkout_request();
        req.payment_method = "barter".into();
        let err = h.engine.checkout(user, req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let mut req = checkout_request();
        req.shipping_address.phone = "   ".into();
        let err = h.engine.checkout(user, req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        assert_eq!(h.orders.order_count().await, 0);
        assert_eq!(h.cart_service.view(user).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn notification_failure_never_fails_the_checkout() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 1).await.unwrap();

        h.sink.set_fail(true);
        let receipt = h.engine.checkout(user, checkout_request()).await.unwrap();
        assert!(h.orders.find_by_id(receipt.order_id).await.unwrap().is_some());
        assert!(h.sink.events().await.is_empty());
    }
}

mod atomicity_and_races {
    use super::*;

    #[tokio::test]
    async fn order_survives_a_failed_cart_clear_and_reconcile_finishes_the_job() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 2).await.unwrap();

        // Cut the clear step out from under the checkout.
        h.carts.set_fail_on_save(true);
        let receipt = h.engine.checkout(user, checkout_request()).await.unwrap();

        // Order stands, cart was not cleared.
        assert!(h.orders.find_by_id(receipt.order_id).await.unwrap().is_some());
        let cart = h.carts.find_by_user(user).await.unwrap().unwrap();
        assert_eq!(cart.items().len(), 1);

        // Reconciliation clears the cart without a duplicate order.
        h.carts.set_fail_on_save(false);
        let reconciled = h.engine.reconcile(user).await.unwrap();
        assert_eq!(reconciled, Some(receipt.order_id));
        assert!(h.carts.find_by_user(user).await.unwrap().unwrap().is_empty());
        assert_eq!(h.orders.order_count().await, 1);
    }

    #[tokio::test]
    async fn resubmitting_an_uncleared_cart_returns_the_existing_order() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 2).await.unwrap();

        h.carts.set_fail_on_save(true);
        let first = h.engine.checkout(user, checkout_request()).await.unwrap();

        h.carts.set_fail_on_save(false);
        let second = h.engine.checkout(user, checkout_request()).await.unwrap();
        assert_eq!(second.order_id, first.order_id);
        assert_eq!(h.orders.order_count().await, 1);
        assert!(h.carts.find_by_user(user).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_checkouts_produce_exactly_one_order() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 2).await.unwrap();

        let (a, b) = tokio::join!(
            h.engine.checkout(user, checkout_request()),
            h.engine.checkout(user, checkout_request()),
        );

        let successes: Vec<_> = [&a, &b].into_iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(successes.len(), 1, "exactly one checkout may create an order");
        let failure = [a.as_ref(), b.as_ref()]
            .into_iter()
            .find_map(|r| r.err())
            .expect("the losing checkout must fail");
        assert!(matches!(failure, AppError::EmptyCart));
        assert_eq!(h.orders.order_count().await, 1);
    }

    #[tokio::test]
    async fn reconcile_is_a_no_op_without_a_matching_order() {
        let h = harness();
        let user = Uuid::new_v4();
        assert_eq!(h.engine.reconcile(user).await.unwrap(), None);

        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 1).await.unwrap();
        assert_eq!(h.engine.reconcile(user).await.unwrap(), None);
        assert_eq!(h.cart_service.view(user).await.unwrap().items.len(), 1);
    }
}

mod order_administration {
    use super::*;

    #[tokio::test]
    async fn status_updates_persist_and_reads_are_owner_scoped() {
        let h = harness();
        let user = Uuid::new_v4();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;
        h.cart_service.add_item(user, eggs, 1).await.unwrap();
        let receipt = h.engine.checkout(user, checkout_request()).await.unwrap();

        let updated = h
            .orders
            .update_order_status(receipt.order_id, OrderStatus::Shipped)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.order_status(), OrderStatus::Shipped);

        let missing = h
            .orders
            .update_order_status(Uuid::new_v4(), OrderStatus::Shipped)
            .await
            .unwrap();
        assert!(missing.is_none());

        let mine = h.orders.find_for_user(user).await.unwrap();
        assert_eq!(mine.len(), 1);
        let theirs = h.orders.find_for_user(Uuid::new_v4()).await.unwrap();
        assert!(theirs.is_empty());
    }

    #[tokio::test]
    async fn summary_reads_exclude_cancelled_revenue() {
        let h = harness();
        let eggs = seed_product(&h, "Tray of eggs", 1000).await;

        let alice = Uuid::new_v4();
        h.cart_service.add_item(alice, eggs, 2).await.unwrap();
        let kept = h.engine.checkout(alice, checkout_request()).await.unwrap();

        let bob = Uuid::new_v4();
        h.cart_service.add_item(bob, eggs, 1).await.unwrap();
        let cancelled = h.engine.checkout(bob, checkout_request()).await.unwrap();
        h.orders
            .update_order_status(cancelled.order_id, OrderStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(h.orders.count().await.unwrap(), 2);
        assert_eq!(h.orders.revenue_total().await.unwrap(), kept.total.amount());

        let recent = h.orders.recent(5).await.unwrap();
        assert_eq!(recent.len(), 2);

        let now = chrono::Utc::now();
        let series = h
            .orders
            .sales_by_day(now - chrono::Duration::days(6), now)
            .await
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].total, kept.total.amount());

        let by_method = h.orders.revenue_by_payment_method().await.unwrap();
        assert_eq!(by_method.len(), 1);
        assert_eq!(by_method[0].total, kept.total.amount());
    }
}
