//! Integration tests for checkout orchestration.

use std::sync::{Arc, Mutex};

use checkout::{
    CheckoutCoordinator, CheckoutError, CheckoutStage, InMemoryNotifier, LogNotifier,
    TicketIssuer,
};
use common::{CartId, TicketId};
use domain::{
    ALL_ITEMS_APPROVED, CartLineItem, FulfillmentStatus, Money, Product, ProductId, Purchaser,
    Ticket, TicketCode,
};
use store::{CartRepository, FileStore, InMemoryStore, ProductRepository, TicketRepository};

type TestCoordinator = CheckoutCoordinator<InMemoryStore, InMemoryNotifier>;

struct TestHarness {
    coordinator: TestCoordinator,
    store: InMemoryStore,
    notifier: InMemoryNotifier,
}

impl TestHarness {
    async fn new(products: Vec<Product>) -> Self {
        let store = InMemoryStore::with_products(products).await;
        let notifier = InMemoryNotifier::new();
        let coordinator = CheckoutCoordinator::new(store.clone(), notifier.clone());
        Self {
            coordinator,
            store,
            notifier,
        }
    }

    async fn cart(&self, lines: &[(&str, u32)]) -> CartId {
        let cart = self.store.create_cart().await.unwrap();
        for (sku, qty) in lines {
            self.store
                .add_cart_item(cart.id(), &ProductId::new(*sku), *qty)
                .await
                .unwrap();
        }
        cart.id()
    }

    async fn stock(&self, sku: &str) -> u32 {
        self.store
            .get_product(&ProductId::new(sku))
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    async fn lines(&self, cart_id: CartId) -> Vec<CartLineItem> {
        self.store
            .get_cart(cart_id)
            .await
            .unwrap()
            .unwrap()
            .items()
            .to_vec()
    }
}

fn product(sku: &str, title: &str, price: i64, stock: u32) -> Product {
    Product::new(sku, title, Money::from_units(price), stock)
}

fn buyer() -> Purchaser {
    Purchaser::new("buyer@example.com").with_name("Buyer")
}

#[tokio::test]
async fn test_partial_fulfillment_keeps_remainder_in_cart() {
    let h = TestHarness::new(vec![product("P", "Pen", 100, 2)]).await;
    let cart_id = h.cart(&[("P", 5)]).await;

    let receipt = h.coordinator.checkout(cart_id, &buyer()).await.unwrap();

    assert_eq!(receipt.total_amount, Money::from_units(200));
    assert_eq!(receipt.outcomes[0].status, FulfillmentStatus::PartiallyFulfilled);
    assert!(receipt.message.contains("3 units"));
    assert_eq!(h.stock("P").await, 0);
    assert_eq!(h.lines(cart_id).await, vec![CartLineItem::new("P", 3)]);
    assert_eq!(receipt.remaining_items, vec![CartLineItem::new("P", 3)]);
}

#[tokio::test]
async fn test_out_of_stock_line_is_untouched_and_ticket_still_issued() {
    let h = TestHarness::new(vec![product("P", "Pen", 100, 0)]).await;
    let cart_id = h.cart(&[("P", 1)]).await;

    let receipt = h.coordinator.checkout(cart_id, &buyer()).await.unwrap();

    assert!(receipt.total_amount.is_zero());
    assert!(receipt.message.contains("out of stock"));
    assert_eq!(h.stock("P").await, 0);
    assert_eq!(h.lines(cart_id).await, vec![CartLineItem::new("P", 1)]);
    assert_eq!(h.store.ticket_count().await, 1);
}

#[tokio::test]
async fn test_mixed_cart_keeps_only_partial_line() {
    let h = TestHarness::new(vec![
        product("A", "Apple", 10, 5),
        product("B", "Banana", 20, 1),
    ])
    .await;
    let cart_id = h.cart(&[("A", 2), ("B", 4)]).await;

    let receipt = h.coordinator.checkout(cart_id, &buyer()).await.unwrap();

    assert_eq!(receipt.total_amount, Money::from_units(40));
    assert_eq!(h.lines(cart_id).await, vec![CartLineItem::new("B", 3)]);
    assert_eq!(h.stock("A").await, 3);
    assert_eq!(h.stock("B").await, 0);
    assert_ne!(receipt.message, ALL_ITEMS_APPROVED);
    assert!(receipt.message.contains("Banana"));
    assert!(!receipt.message.contains("Apple"));
}

#[tokio::test]
async fn test_repeat_checkout_never_recharges() {
    let h = TestHarness::new(vec![product("P", "Pen", 100, 2)]).await;
    let cart_id = h.cart(&[("P", 5)]).await;

    h.coordinator.checkout(cart_id, &buyer()).await.unwrap();
    let second = h.coordinator.checkout(cart_id, &buyer()).await.unwrap();

    assert!(second.total_amount.is_zero());
    assert_eq!(h.stock("P").await, 0);
    assert_eq!(h.lines(cart_id).await, vec![CartLineItem::new("P", 3)]);
}

#[tokio::test]
async fn test_missing_product_aborts_before_any_write() {
    let h = TestHarness::new(vec![product("A", "Apple", 10, 5)]).await;
    let cart_id = h.cart(&[("A", 1)]).await;
    // save_cart does not check the catalog, so the second line dangles.
    let dangling = domain::Cart::from_items(
        cart_id,
        vec![CartLineItem::new("A", 1), CartLineItem::new("ghost", 1)],
    )
    .unwrap();
    h.store.save_cart(&dangling).await.unwrap();

    let err = h.coordinator.checkout(cart_id, &buyer()).await.unwrap_err();

    assert_eq!(err.stage(), CheckoutStage::Reconcile);
    assert_eq!(h.stock("A").await, 5);
    assert_eq!(h.lines(cart_id).await, dangling.items());
    assert_eq!(h.store.ticket_count().await, 0);
}

#[tokio::test]
async fn test_stock_failure_restores_earlier_decrements() {
    let h = TestHarness::new(vec![
        product("A", "Apple", 10, 5),
        product("B", "Banana", 20, 5),
    ])
    .await;
    let cart_id = h.cart(&[("A", 2), ("B", 1)]).await;
    h.store.set_fail_on_decrement("B");

    let err = h.coordinator.checkout(cart_id, &buyer()).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::StockUpdate { ref product_id, .. } if product_id.as_str() == "B"
    ));
    assert_eq!(h.stock("A").await, 5);
    assert_eq!(h.stock("B").await, 5);
    assert_eq!(h.lines(cart_id).await.len(), 2);
}

#[tokio::test]
async fn test_cart_failure_restores_stock() {
    let h = TestHarness::new(vec![product("A", "Apple", 10, 5)]).await;
    let cart_id = h.cart(&[("A", 2)]).await;
    h.store.set_fail_on_cart_update(true);

    let err = h.coordinator.checkout(cart_id, &buyer()).await.unwrap_err();

    assert_eq!(err.stage(), CheckoutStage::PersistCart);
    assert_eq!(h.stock("A").await, 5);
    assert_eq!(h.lines(cart_id).await, vec![CartLineItem::new("A", 2)]);
    assert_eq!(h.store.ticket_count().await, 0);
}

#[tokio::test]
async fn test_failed_compensation_still_reports_original_error() {
    let h = TestHarness::new(vec![product("A", "Apple", 10, 5)]).await;
    let cart_id = h.cart(&[("A", 2)]).await;
    h.store.set_fail_on_ticket_insert(true);
    h.store.set_fail_on_increment(true);

    let err = h.coordinator.checkout(cart_id, &buyer()).await.unwrap_err();

    assert_eq!(err.stage(), CheckoutStage::IssueTicket);
    // Stock could not be put back; the cart snapshot still was.
    assert_eq!(h.stock("A").await, 3);
    assert_eq!(h.lines(cart_id).await, vec![CartLineItem::new("A", 2)]);
}

#[tokio::test]
async fn test_concurrent_checkouts_never_oversell() {
    let h = TestHarness::new(vec![product("P", "Pen", 100, 1)]).await;
    let coordinator = Arc::new(h.coordinator);
    let first = {
        let cart = h.store.create_cart().await.unwrap();
        h.store
            .add_cart_item(cart.id(), &ProductId::new("P"), 1)
            .await
            .unwrap();
        cart.id()
    };
    let second = {
        let cart = h.store.create_cart().await.unwrap();
        h.store
            .add_cart_item(cart.id(), &ProductId::new("P"), 1)
            .await
            .unwrap();
        cart.id()
    };

    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|cart_id| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.checkout(cart_id, &buyer()).await })
        })
        .collect();

    let mut charged = Money::zero();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => charged = charged.checked_add(receipt.total_amount).unwrap(),
            Err(e) => assert!(e.is_insufficient_stock()),
        }
    }

    let stock = h
        .store
        .get_product(&ProductId::new("P"))
        .await
        .unwrap()
        .unwrap()
        .stock;
    assert_eq!(stock, 0);
    assert_eq!(charged, Money::from_units(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_of_one_cart_charge_once() {
    const TRIALS: u32 = 200;
    let h = TestHarness::new(vec![product("P", "Pen", 100, 1000)]).await;
    let store = h.store.clone();
    let coordinator = Arc::new(h.coordinator);

    for _ in 0..TRIALS {
        let cart = store.create_cart().await.unwrap();
        store
            .add_cart_item(cart.id(), &ProductId::new("P"), 3)
            .await
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let cart_id = cart.id();
                tokio::spawn(async move { coordinator.checkout(cart_id, &buyer()).await })
            })
            .collect();

        let mut completed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => {
                    completed += 1;
                    assert_eq!(receipt.total_amount, Money::from_units(300));
                }
                Err(e) => assert!(matches!(e, CheckoutError::EmptyCart(_))),
            }
        }
        assert_eq!(completed, 1);
    }

    let stock = store
        .get_product(&ProductId::new("P"))
        .await
        .unwrap()
        .unwrap()
        .stock;
    assert_eq!(stock, 1000 - 3 * TRIALS);
    assert_eq!(store.ticket_count().await, TRIALS as usize);
}

#[tokio::test]
async fn test_negative_price_aborts_before_any_write() {
    // with_products loads the catalog without the save-time price check.
    let h = TestHarness::new(vec![
        product("A", "Apple", 10, 5),
        Product::new("N", "Refund", Money::from_cents(-100), 5),
    ])
    .await;
    let cart_id = h.cart(&[("A", 1), ("N", 1)]).await;

    let err = h.coordinator.checkout(cart_id, &buyer()).await.unwrap_err();

    assert!(matches!(err, CheckoutError::InvalidPrice { .. }));
    assert_eq!(err.stage(), CheckoutStage::Reconcile);
    assert_eq!(h.stock("A").await, 5);
    assert_eq!(h.stock("N").await, 5);
    assert_eq!(h.lines(cart_id).await.len(), 2);
    assert_eq!(h.store.ticket_count().await, 0);
}

#[tokio::test]
async fn test_receipt_goes_to_purchaser() {
    let h = TestHarness::new(vec![product("P", "Pen", 5, 3)]).await;
    let cart_id = h.cart(&[("P", 1)]).await;

    let receipt = h.coordinator.checkout(cart_id, &buyer()).await.unwrap();

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "buyer@example.com");
    assert_eq!(
        sent[0].subject,
        format!("Your purchase ticket {}", receipt.ticket.code())
    );
}

#[tokio::test]
async fn test_ticket_code_collision_is_retried() {
    let store = InMemoryStore::with_products(vec![product("P", "Pen", 5, 3)]).await;
    let taken = TicketCode::parse("C-000000000007").unwrap();
    store
        .insert_ticket(&Ticket::new(
            TicketId::new(),
            taken.clone(),
            chrono::Utc::now(),
            Money::zero(),
            "someone@example.com",
        ))
        .await
        .unwrap();

    let fresh = TicketCode::parse("C-000000000008").unwrap();
    let calls = Arc::new(Mutex::new(0u32));
    let codes = {
        let calls = Arc::clone(&calls);
        let (taken, fresh) = (taken.clone(), fresh.clone());
        Arc::new(move || {
            let mut n = calls.lock().unwrap();
            *n += 1;
            if *n == 1 { taken.clone() } else { fresh.clone() }
        })
    };
    let issuer = TicketIssuer::with_code_source(store.clone(), codes);
    let coordinator = CheckoutCoordinator::with_issuer(store.clone(), issuer, LogNotifier);

    let cart = store.create_cart().await.unwrap();
    store
        .add_cart_item(cart.id(), &ProductId::new("P"), 1)
        .await
        .unwrap();

    let receipt = coordinator.checkout(cart.id(), &buyer()).await.unwrap();

    assert_eq!(receipt.ticket.code(), &fresh);
    assert_eq!(*calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_checkout_over_file_store() {
    let dir = std::env::temp_dir().join(format!("checkout-test-{}", TicketId::new()));
    let store = FileStore::open(&dir).await.unwrap();
    store.save_product(product("P", "Pen", 100, 5)).await.unwrap();
    let cart = store.create_cart().await.unwrap();
    store
        .add_cart_item(cart.id(), &ProductId::new("P"), 3)
        .await
        .unwrap();

    let coordinator = CheckoutCoordinator::new(store.clone(), InMemoryNotifier::new());
    let receipt = coordinator.checkout(cart.id(), &buyer()).await.unwrap();

    let reopened = FileStore::open(&dir).await.unwrap();
    assert_eq!(receipt.total_amount, Money::from_units(300));
    assert_eq!(
        reopened
            .get_product(&ProductId::new("P"))
            .await
            .unwrap()
            .unwrap()
            .stock,
        2
    );
    assert_eq!(reopened.list_tickets().await.unwrap().len(), 1);
}
