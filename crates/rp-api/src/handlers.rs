//! API Handlers: plain endpoints plus the pipelines behind /v1
use axum::{http::StatusCode, Json};
use rp_core::{chain, if_else, in_parallel, Chain, SharedLogger};
use rp_stages::{
    bind, ctx_get, ctx_set, field_value, find, func, insert, pipe, query_param, respond, to_uuid,
    url_param, SharedStore, StageExt, ID_FIELD,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::route::Route;

/// Context key of the document store handle.
pub const DB: &str = "db";

pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") })),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewItem {
    pub sku: String,
    pub name: String,
    /// In cents.
    pub price: u64,
    pub stock: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub customer_id: String,
    pub sku: String,
    pub quantity: u64,
}

/// Options shared by every /v1 route.
#[derive(Clone)]
pub struct RouteOptions {
    pub store: SharedStore,
    pub logger: Option<SharedLogger>,
    pub log_branches: bool,
}

/// All /v1 routes, each with the store installed under [`DB`].
pub fn v1_routes(options: &RouteOptions) -> Vec<Route> {
    let routes = vec![
        Route::post("/v1/customers", create_customer()),
        Route::get("/v1/customers/{id}", get_customer()),
        Route::post("/v1/inventory", create_item()),
        Route::get("/v1/inventory", list_items()),
        Route::post("/v1/orders", purchase(options.log_branches)),
    ];

    routes
        .into_iter()
        .map(|route| {
            let store = Arc::clone(&options.store);
            route
                .with_logger(options.logger.clone())
                .with_context(move |ctx| ctx.set(DB, Arc::clone(&store)))
        })
        .collect()
}

fn create_customer() -> Chain {
    chain![
        bind::<NewCustomer>(),
        insert(DB, "customers"),
        func("  => { id } =>", |id, _| Ok(json!({ "id": id }))),
        respond(StatusCode::CREATED),
    ]
}

fn get_customer() -> Chain {
    chain![
        url_param("id"),
        to_uuid(),
        find(DB, "customers").projection(json!({ "name": 1, "email": 1 })),
        respond(StatusCode::OK),
    ]
}

fn create_item() -> Chain {
    chain![
        bind::<NewItem>(),
        func("  => keyed by sku =>", |mut item, _| {
            item[ID_FIELD] = item["sku"].clone();
            Ok(item)
        }),
        insert(DB, "inventory").catch_prefix("Inventory"),
        func("  => { sku } =>", |sku, _| Ok(json!({ "sku": sku }))),
        respond(StatusCode::CREATED),
    ]
}

/// Lists items with at least `?min_stock=` units (default 1), cheapest first.
fn list_items() -> Chain {
    chain![
        query_param("min_stock"),
        func("  => stock filter =>", |raw, _| {
            let min_stock = match raw.as_str() {
                None | Some("") => 1,
                Some(raw) => raw.parse::<u64>()?,
            };
            Ok(json!([
                { "$match": { "stock": { "$gte": min_stock } } },
                { "$sort": { "price": 1 } },
                { "$project": { "_id": 0, "sku": "$_id", "name": 1, "price": 1, "stock": 1 } },
            ]))
        }),
        pipe(DB, "inventory"),
        respond(StatusCode::OK),
    ]
}

/// Fetches the customer and the item concurrently, checks stock, then
/// records the order.
fn purchase(log_branches: bool) -> Chain {
    chain![
        bind::<PurchaseRequest>(),
        ctx_set("request.purchase"),
        in_parallel(vec![
            chain![
                ctx_get("request.purchase"),
                field_value("customer_id"),
                find(DB, "customers").catch_prefix("Customer"),
                ctx_set("db.customer"),
            ],
            chain![
                ctx_get("request.purchase"),
                field_value("sku"),
                find(DB, "inventory").catch_prefix("Item"),
                ctx_set("db.item"),
            ],
        ])
        .log_branches(log_branches),
        func("in_stock([\"db.item\"]) =>", |_, ctx| {
            let item = ctx.must_get_value("db.item")?;
            let purchase = ctx.must_get_value("request.purchase")?;
            Ok(json!(item["stock"].as_u64() >= purchase["quantity"].as_u64()))
        }),
        if_else(
            |in_stock, _| in_stock.as_bool() != Some(true),
            Some(
                Chain::first(func("out of stock", |_, _| Err("insufficient stock".into())))
                    .catch(StatusCode::CONFLICT, "Item is out of stock"),
            ),
            None,
        ),
        func("order([\"db.customer\"], [\"db.item\"]) =>", |_, ctx| {
            let customer = ctx.must_get_value("db.customer")?;
            let item = ctx.must_get_value("db.item")?;
            let purchase = ctx.must_get_value("request.purchase")?;
            let quantity = purchase["quantity"].as_u64().unwrap_or(0);
            let total = item["price"].as_u64().unwrap_or(0) * quantity;
            Ok(json!({
                "customer": customer[ID_FIELD],
                "item": item[ID_FIELD],
                "quantity": quantity,
                "total": total,
            }))
        }),
        ctx_set("order"),
        insert(DB, "orders"),
        func("  => receipt([\"order\"]) =>", |id, ctx| {
            let order = ctx.must_get_value("order")?;
            Ok(json!({ "order_id": id, "total": order["total"] }))
        }),
        respond(StatusCode::CREATED),
    ]
}
