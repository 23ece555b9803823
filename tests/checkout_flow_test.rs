mod common;

use assert_matches::assert_matches;
use common::{sample_address, seed_category, seed_product, seed_user, ProductSeed, TestApp};
use goatmart::{
    entities::{order_item, Cart, Order, OrderItem, OrderStatus, PaymentMethod, Product},
    errors::ServiceError,
    events::Event,
    services::{
        cart::{AddItemInput, CartOwner},
        checkout::PlaceOrderInput,
    },
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Statement};

fn order_input() -> PlaceOrderInput {
    PlaceOrderInput {
        shipping_address: sample_address("Budi Santoso"),
        billing_address: sample_address("Budi Santoso"),
        payment_method: PaymentMethod::BankTransfer,
        notes: None,
    }
}

#[tokio::test]
async fn checkout_totals_match_the_store_policy() {
    let app = TestApp::new().await;
    let user = seed_user(&app, "Budi", None).await;
    let category = seed_category(&app, "Bucks").await;
    let product_a = seed_product(
        &app,
        category.id,
        ProductSeed {
            price: Decimal::from(2_500_000),
            stock_quantity: 10,
            ..Default::default()
        },
    )
    .await;
    let product_b = seed_product(
        &app,
        category.id,
        ProductSeed {
            name: "Saanen Doe",
            price: Decimal::from(3_000_000),
            stock_quantity: 5,
            ..Default::default()
        },
    )
    .await;
    let owner = CartOwner::User(user.id);

    app.services
        .cart
        .add_item(
            &owner,
            AddItemInput {
                product_id: product_a.id,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    app.services
        .cart
        .add_item(
            &owner,
            AddItemInput {
                product_id: product_b.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let order = app
        .services
        .checkout
        .place_order(user.id, order_input())
        .await
        .unwrap();

    assert_eq!(order.subtotal, Decimal::from(8_000_000));
    assert_eq!(order.tax_amount, Decimal::from(880_000));
    assert_eq!(order.shipping_amount, Decimal::from(50_000));
    assert_eq!(order.total_amount, Decimal::from(8_930_000));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, "pending");
    assert!(order.order_number.starts_with("GM-"));

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    let items_total: Decimal = items.iter().map(|i| i.total).sum();
    assert_eq!(items_total, Decimal::from(8_000_000));

    // Snapshots, not references.
    let snapshot = items
        .iter()
        .find(|i| i.product_id == product_a.id)
        .unwrap();
    assert_eq!(snapshot.product_name, product_a.name);
    assert_eq!(snapshot.product_sku, product_a.sku);

    // Stock decremented by exactly the ordered quantities.
    let a = Product::find_by_id(product_a.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let b = Product::find_by_id(product_b.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.stock_quantity, 8);
    assert_eq!(b.stock_quantity, 4);
}

#[tokio::test]
async fn preorder_lines_do_not_touch_stock() {
    let app = TestApp::new().await;
    let user = seed_user(&app, "Budi", None).await;
    let category = seed_category(&app, "Bucks").await;
    let preorder = seed_product(
        &app,
        category.id,
        ProductSeed {
            name: "Boer Kid",
            price: Decimal::from(1_000_000),
            stock_quantity: 0,
            allow_preorder: true,
            ..Default::default()
        },
    )
    .await;
    let regular = seed_product(
        &app,
        category.id,
        ProductSeed {
            price: Decimal::from(2_000_000),
            stock_quantity: 3,
            ..Default::default()
        },
    )
    .await;
    let owner = CartOwner::User(user.id);

    app.services
        .cart
        .add_item(
            &owner,
            AddItemInput {
                product_id: preorder.id,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    app.services
        .cart
        .add_item(
            &owner,
            AddItemInput {
                product_id: regular.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let order = app
        .services
        .checkout
        .place_order(user.id, order_input())
        .await
        .unwrap();

    let preorder_after = Product::find_by_id(preorder.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let regular_after = Product::find_by_id(regular.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(preorder_after.stock_quantity, 0);
    assert_eq!(regular_after.stock_quantity, 2);

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .all(&*app.db)
        .await
        .unwrap();
    let preorder_line = items.iter().find(|i| i.product_id == preorder.id).unwrap();
    assert!(preorder_line.is_preorder);
}

#[tokio::test]
async fn checkout_without_a_cart_is_rejected() {
    let app = TestApp::new().await;
    let user = seed_user(&app, "Budi", None).await;

    let err = app
        .services
        .checkout
        .place_order(user.id, order_input())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);
}

#[tokio::test]
async fn checkout_with_an_empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let user = seed_user(&app, "Budi", None).await;
    app.services
        .cart
        .get_or_create_cart(&CartOwner::User(user.id))
        .await
        .unwrap();

    let err = app
        .services
        .checkout
        .place_order(user.id, order_input())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);
}

#[tokio::test]
async fn invalid_addresses_fail_before_any_transaction() {
    let app = TestApp::new().await;
    let user = seed_user(&app, "Budi", None).await;
    let category = seed_category(&app, "Bucks").await;
    let product = seed_product(&app, category.id, ProductSeed::default()).await;
    let owner = CartOwner::User(user.id);

    app.services
        .cart
        .add_item(
            &owner,
            AddItemInput {
                product_id: product.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let mut input = order_input();
    input.shipping_address.name = String::new();

    let err = app
        .services
        .checkout
        .place_order(user.id, input)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // The cart is untouched.
    let cart = app.services.cart.get_cart_with_items(&owner).await.unwrap();
    assert_eq!(cart.items.len(), 1);
}

#[tokio::test]
async fn failed_checkout_rolls_back_everything() {
    let app = TestApp::new().await;
    let user = seed_user(&app, "Budi", None).await;
    let category = seed_category(&app, "Bucks").await;
    let kept = seed_product(
        &app,
        category.id,
        ProductSeed {
            stock_quantity: 10,
            ..Default::default()
        },
    )
    .await;
    let doomed = seed_product(
        &app,
        category.id,
        ProductSeed {
            name: "Saanen Doe",
            price: Decimal::from(3_000_000),
            stock_quantity: 5,
            ..Default::default()
        },
    )
    .await;
    let owner = CartOwner::User(user.id);

    app.services
        .cart
        .add_item(
            &owner,
            AddItemInput {
                product_id: kept.id,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    app.services
        .cart
        .add_item(
            &owner,
            AddItemInput {
                product_id: doomed.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    // Simulate the product vanishing between add-to-cart and checkout.
    app.db
        .execute(Statement::from_string(
            app.db.get_database_backend(),
            "PRAGMA foreign_keys = OFF;".to_string(),
        ))
        .await
        .unwrap();
    Product::delete_by_id(doomed.id)
        .exec(&*app.db)
        .await
        .unwrap();

    let err = app
        .services
        .checkout
        .place_order(user.id, order_input())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    // Nothing from the aborted transaction is observable.
    assert_eq!(Order::find().count(&*app.db).await.unwrap(), 0);
    assert_eq!(OrderItem::find().count(&*app.db).await.unwrap(), 0);

    let kept_after = Product::find_by_id(kept.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept_after.stock_quantity, 10);

    let cart = app.services.cart.get_cart_with_items(&owner).await.unwrap();
    assert_eq!(cart.items.len(), 2);
}

#[tokio::test]
async fn checkout_destroys_the_cart_and_cannot_run_twice() {
    let app = TestApp::new().await;
    let user = seed_user(&app, "Budi", None).await;
    let category = seed_category(&app, "Bucks").await;
    let product = seed_product(&app, category.id, ProductSeed::default()).await;
    let owner = CartOwner::User(user.id);

    let item = app
        .services
        .cart
        .add_item(
            &owner,
            AddItemInput {
                product_id: product.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();
    let converted_cart_id = item.cart_id;

    app.services
        .checkout
        .place_order(user.id, order_input())
        .await
        .unwrap();

    // The original cart row is gone.
    assert!(Cart::find_by_id(converted_cart_id)
        .one(&*app.db)
        .await
        .unwrap()
        .is_none());

    // A second checkout against the vanished cart fails as empty.
    let err = app
        .services
        .checkout
        .place_order(user.id, order_input())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);

    // Find-or-create now builds a brand-new, empty cart.
    let fresh = app.services.cart.get_cart_with_items(&owner).await.unwrap();
    assert_ne!(fresh.cart.id, converted_cart_id);
    assert!(fresh.items.is_empty());
}

#[tokio::test]
async fn order_numbers_are_unique_per_order() {
    let app = TestApp::new().await;
    let category = seed_category(&app, "Bucks").await;
    let mut numbers = Vec::new();

    for name in ["Alice", "Bob", "Citra"] {
        let user = seed_user(&app, name, None).await;
        let product = seed_product(&app, category.id, ProductSeed::default()).await;
        app.services
            .cart
            .add_item(
                &CartOwner::User(user.id),
                AddItemInput {
                    product_id: product.id,
                    quantity: 1,
                },
            )
            .await
            .unwrap();
        let order = app
            .services
            .checkout
            .place_order(user.id, order_input())
            .await
            .unwrap();
        numbers.push(order.order_number);
    }

    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 3);
}

#[tokio::test]
async fn users_cannot_read_each_others_orders() {
    let app = TestApp::new().await;
    let alice = seed_user(&app, "Alice", None).await;
    let bob = seed_user(&app, "Bob", None).await;
    let category = seed_category(&app, "Bucks").await;
    let product = seed_product(&app, category.id, ProductSeed::default()).await;

    app.services
        .cart
        .add_item(
            &CartOwner::User(alice.id),
            AddItemInput {
                product_id: product.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();
    let order = app
        .services
        .checkout
        .place_order(alice.id, order_input())
        .await
        .unwrap();

    let err = app
        .services
        .orders
        .get_for_user(order.id, bob.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let own = app
        .services
        .orders
        .get_for_user(order.id, alice.id)
        .await
        .unwrap();
    assert_eq!(own.order.id, order.id);
    assert_eq!(own.items.len(), 1);

    let (orders, total) = app
        .services
        .orders
        .list_for_user(alice.id, 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders[0].id, order.id);
}

#[tokio::test]
async fn successful_checkout_emits_order_placed() {
    let mut app = TestApp::new().await;
    let user = seed_user(&app, "Budi", None).await;
    let category = seed_category(&app, "Bucks").await;
    let product = seed_product(&app, category.id, ProductSeed::default()).await;

    app.services
        .cart
        .add_item(
            &CartOwner::User(user.id),
            AddItemInput {
                product_id: product.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();
    let order = app
        .services
        .checkout
        .place_order(user.id, order_input())
        .await
        .unwrap();

    let mut placed = None;
    while let Ok(event) = app.events.try_recv() {
        if let Event::OrderPlaced {
            order_id,
            user_id,
            total_amount,
        } = event
        {
            placed = Some((order_id, user_id, total_amount));
        }
    }

    let (order_id, user_id, total_amount) = placed.expect("OrderPlaced event expected");
    assert_eq!(order_id, order.id);
    assert_eq!(user_id, user.id);
    assert_eq!(total_amount, order.total_amount);
}
