mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use order_desk::{auth::Role, entities::order::OrderStatus};
use serde_json::{json, Value};

/// Seeded cast: admin, manager, two staff members and two customers
struct Cast {
    admin: String,
    manager: String,
    manager_id: i32,
    staff: String,
    staff_id: i32,
    other_staff: String,
    customer: String,
    customer_id: i32,
    other_customer: String,
}

async fn cast(app: &TestApp) -> Cast {
    app.seed_user("admin", "pw", Role::Admin).await;
    let manager_id = app.seed_user("manager", "pw", Role::Manager).await;
    let staff_id = app.seed_user("staff", "pw", Role::Staff).await;
    app.seed_user("staff2", "pw", Role::Staff).await;
    let customer_id = app.seed_user("customer", "pw", Role::Customer).await;
    app.seed_user("customer2", "pw", Role::Customer).await;

    Cast {
        admin: app.login("admin", "pw").await,
        manager: app.login("manager", "pw").await,
        manager_id,
        staff: app.login("staff", "pw").await,
        staff_id,
        other_staff: app.login("staff2", "pw").await,
        customer: app.login("customer", "pw").await,
        customer_id,
        other_customer: app.login("customer2", "pw").await,
    }
}

fn order_body(description: &str) -> Value {
    json!({
        "description": description,
        "address": "12 Le Loi, District 1",
        "phone": "0901234567",
        "total": 125.5
    })
}

async fn create_order(app: &TestApp, token: &str, description: &str) -> i32 {
    let (status, body) = app
        .request(
            Method::POST,
            "/api/orders/create",
            Some(token),
            Some(order_body(description)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["message"], "Order created");
    body["order_id"].as_i64().expect("order_id") as i32
}

async fn assign(app: &TestApp, token: &str, order_id: i32, staff_id: i32) -> (StatusCode, Value) {
    app.request(
        Method::PUT,
        &format!("/api/orders/assign/{order_id}"),
        Some(token),
        Some(json!({"staff_id": staff_id})),
    )
    .await
}

async fn set_status(app: &TestApp, token: &str, order_id: i32, status: &str) -> (StatusCode, Value) {
    app.request(
        Method::PUT,
        &format!("/api/orders/update-status/{order_id}"),
        Some(token),
        Some(json!({"status": status})),
    )
    .await
}

#[tokio::test]
async fn created_order_shows_up_pending_and_unassigned() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;
    let order_id = create_order(&app, &cast.customer, "3 boxes of tea").await;

    let (status, body) = app
        .request(Method::GET, "/api/orders/my-orders", Some(&cast.customer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order["id"], order_id);
    assert_eq!(order["status"], "Pending");
    assert_eq!(order["staff_name"], Value::Null);
    assert_eq!(order["staff_id"], Value::Null);
    assert_eq!(order["customer_name"], "customer full");
    assert_eq!(order["customer_id"], cast.customer_id);
    assert_eq!(order["description"], "3 boxes of tea");

    // Other customers do not see it
    let (_, body) = app
        .request(Method::GET, "/api/orders/my-orders", Some(&cast.other_customer), None)
        .await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn create_validates_required_fields() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;

    let bad = [
        json!({"address": "x", "phone": "1"}),
        json!({"description": "x", "address": "", "phone": "1"}),
        json!({"description": "x", "address": "y", "phone": "1", "total": -3}),
    ];
    for payload in bad {
        let (status, body) = app
            .request(Method::POST, "/api/orders/create", Some(&cast.customer), Some(payload.clone()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}: {body}");
        assert!(body["message"].is_string());
    }

    // Total is optional
    let (status, _) = app
        .request(
            Method::POST,
            "/api/orders/create",
            Some(&cast.customer),
            Some(json!({"description": "x", "address": "y", "phone": "1"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Staff cannot place orders
    let (status, _) = app
        .request(
            Method::POST,
            "/api/orders/create",
            Some(&cast.staff),
            Some(order_body("nope")),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn listings_are_newest_first() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;
    let first = create_order(&app, &cast.customer, "first").await;
    let second = create_order(&app, &cast.customer, "second").await;
    let third = create_order(&app, &cast.other_customer, "third").await;

    let (status, body) = app
        .request(Method::GET, "/api/orders/all", Some(&cast.manager), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![third as i64, second as i64, first as i64]);
}

#[tokio::test]
async fn assign_only_from_pending() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;
    let order_id = create_order(&app, &cast.customer, "parcel").await;

    let (status, body) = assign(&app, &cast.manager, order_id, cast.staff_id).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["order_id"], order_id);

    let stored = app.find_order(order_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Assigned);
    assert_eq!(stored.staff_id, Some(cast.staff_id));
    assert_eq!(stored.manager_id, Some(cast.manager_id));

    let (status, body) = assign(&app, &cast.manager, order_id, cast.staff_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot assign. Order status: Assigned");

    // The customer now sees the staff member's name
    let (_, body) = app
        .request(Method::GET, "/api/orders/my-orders", Some(&cast.customer), None)
        .await;
    assert_eq!(body[0]["staff_name"], "staff full");
}

#[tokio::test]
async fn assign_rejects_bad_targets() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;
    let order_id = create_order(&app, &cast.customer, "parcel").await;

    let (status, _) = assign(&app, &cast.manager, order_id, cast.customer_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = assign(&app, &cast.manager, order_id, 9999).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = assign(&app, &cast.manager, 9999, cast.staff_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/orders/assign/{order_id}"),
            Some(&cast.manager),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing changed
    let stored = app.find_order(order_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.staff_id, None);
}

#[tokio::test]
async fn unassign_returns_order_to_pending() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;
    let order_id = create_order(&app, &cast.customer, "parcel").await;
    assign(&app, &cast.admin, order_id, cast.staff_id).await;
    set_status(&app, &cast.staff, order_id, "In Progress").await;

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/orders/unassign/{order_id}"),
            Some(&cast.manager),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let stored = app.find_order(order_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.staff_id, None);
    assert_eq!(stored.manager_id, None);

    let history = app.deliveries(order_id).await;
    let trail: Vec<(OrderStatus, i32)> = history.iter().map(|d| (d.status, d.staff_id)).collect();
    assert_eq!(
        trail,
        vec![
            (OrderStatus::Assigned, cast.staff_id),
            (OrderStatus::InProgress, cast.staff_id),
            (OrderStatus::Cancelled, cast.staff_id),
        ]
    );
    assert_eq!(history.last().unwrap().assigned_by, cast.manager_id);
}

#[tokio::test]
async fn unassign_twice_fails_the_same_way() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;
    let order_id = create_order(&app, &cast.customer, "parcel").await;
    let uri = format!("/api/orders/unassign/{order_id}");

    let first = app.request(Method::PUT, &uri, Some(&cast.manager), None).await;
    let second = app.request(Method::PUT, &uri, Some(&cast.manager), None).await;

    assert_eq!(first.0, StatusCode::BAD_REQUEST);
    assert_eq!(second.0, StatusCode::BAD_REQUEST);
    assert_eq!(first.1["message"], second.1["message"]);
    assert_eq!(first.1["message"], "Cannot unassign. Order status: Pending");

    let (status, _) = app
        .request(Method::PUT, "/api/orders/unassign/9999", Some(&cast.manager), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_assigned_staff_member_may_update_status() {
    let app = TestApp::new().await;
    app.seed_user_with_id(3, "buyer", "pw", Role::Customer).await;
    app.seed_user_with_id(7, "staff7", "pw", Role::Staff).await;
    app.seed_user_with_id(9, "staff9", "pw", Role::Staff).await;
    app.seed_order(5, 3, Some(9), OrderStatus::Assigned).await;

    let staff7 = app.login("staff7", "pw").await;
    let staff9 = app.login("staff9", "pw").await;

    let (status, _) = set_status(&app, &staff7, 5, "Delivered").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.find_order(5).await.unwrap().status, OrderStatus::Assigned);

    let (status, body) = set_status(&app, &staff9, 5, "Delivered").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.find_order(5).await.unwrap().status, OrderStatus::Delivered);

    // No longer active, so even the assignee is refused
    let (status, _) = set_status(&app, &staff9, 5, "Completed").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn status_outside_staff_set_is_rejected_before_lookup() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;

    for requested in ["Pending", "Assigned", "Shipped", ""] {
        let (status, _) = set_status(&app, &cast.staff, 9999, requested).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{requested:?}");
    }

    // A valid status on an unknown order is indistinguishable from someone else's
    let (status, _) = set_status(&app, &cast.staff, 9999, "Completed").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn assigned_tasks_lists_active_orders_of_the_caller() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;
    let held = create_order(&app, &cast.customer, "held").await;
    let done = create_order(&app, &cast.customer, "done").await;
    create_order(&app, &cast.customer, "still pending").await;
    assign(&app, &cast.manager, held, cast.staff_id).await;
    assign(&app, &cast.manager, done, cast.staff_id).await;
    set_status(&app, &cast.staff, done, "Completed").await;

    let (status, body) = app
        .request(Method::GET, "/api/orders/assigned-tasks", Some(&cast.staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let tasks = body.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], held);
    assert_eq!(tasks[0]["customer_name"], "customer full");

    let (_, body) = app
        .request(Method::GET, "/api/orders/assigned-tasks", Some(&cast.other_staff), None)
        .await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn customers_edit_only_their_own_pending_orders() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;
    let order_id = create_order(&app, &cast.customer, "original").await;
    let uri = format!("/api/orders/update/{order_id}");

    let (status, _) = app
        .request(Method::PUT, &uri, Some(&cast.other_customer), Some(order_body("hijack")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(Method::PUT, &uri, Some(&cast.customer), Some(order_body("edited")))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.find_order(order_id).await.unwrap().description, "edited");

    assign(&app, &cast.manager, order_id, cast.staff_id).await;
    let (status, _) = app
        .request(Method::PUT, &uri, Some(&cast.customer), Some(order_body("too late")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admin may still edit an assigned order
    let (status, _) = app
        .request(Method::PUT, &uri, Some(&cast.admin), Some(order_body("by admin")))
        .await;
    assert_eq!(status, StatusCode::OK);
    let stored = app.find_order(order_id).await.unwrap();
    assert_eq!(stored.description, "by admin");
    assert_eq!(stored.status, OrderStatus::Assigned);

    // Managers are not order editors
    let (status, _) = app
        .request(Method::PUT, &uri, Some(&cast.manager), Some(order_body("manager")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn terminal_orders_are_frozen_for_everyone() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;

    for terminal in ["Completed", "Cancelled"] {
        let order_id = create_order(&app, &cast.customer, terminal).await;
        assign(&app, &cast.manager, order_id, cast.staff_id).await;
        let (status, _) = set_status(&app, &cast.staff, order_id, terminal).await;
        assert_eq!(status, StatusCode::OK);

        for token in [&cast.admin, &cast.customer] {
            let (status, body) = app
                .request(
                    Method::PUT,
                    &format!("/api/orders/update/{order_id}"),
                    Some(token),
                    Some(order_body("late edit")),
                )
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert!(body["message"].as_str().unwrap().contains(terminal));

            let (status, _) = app
                .request(
                    Method::DELETE,
                    &format!("/api/orders/delete/{order_id}"),
                    Some(token),
                    None,
                )
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert!(app.find_order(order_id).await.is_some());
    }
}

#[tokio::test]
async fn delete_removes_order_and_its_audit_rows() {
    let app = TestApp::new().await;
    let cast = cast(&app).await;
    let own = create_order(&app, &cast.customer, "mine").await;
    let assigned = create_order(&app, &cast.customer, "assigned").await;
    assign(&app, &cast.manager, assigned, cast.staff_id).await;

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/orders/delete/{own}"), Some(&cast.other_customer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(Method::DELETE, &format!("/api/orders/delete/{own}"), Some(&cast.customer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_id"], own);
    assert!(app.find_order(own).await.is_none());

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/orders/delete/{assigned}"), Some(&cast.customer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/orders/delete/{assigned}"), Some(&cast.admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.find_order(assigned).await.is_none());
    assert!(app.deliveries(assigned).await.is_empty());

    let (status, _) = app
        .request(Method::DELETE, "/api/orders/delete/9999", Some(&cast.admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
