use axum::{
    Router,
    routing::{get, post},
};

pub mod admin;
pub mod cart;
pub mod orders;
pub mod products;
pub mod system;

/// Router for the storefront and admin endpoints. Identity is optional at
/// this level; handlers that need one check it themselves.
pub fn router() -> Router {
    Router::new()
        .route("/cart", get(cart::get_cart))
        .route("/add-to-cart", post(cart::add_to_cart))
        .route("/update-cart", post(cart::update_cart))
        .route("/remove-from-cart", post(cart::remove_from_cart))
        .route("/clear-cart", post(cart::clear_cart))
        .route("/merge-cart", post(cart::merge_cart))
        .route("/create-order", post(orders::create_order))
        .route("/products/:slug", get(products::get_product))
        .nest("/admin", admin::router())
}
