use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        orders::{OrderItemInput, OrderList, OrderWithItems, PlaceOrderRequest, PlacedOrder},
        products::{
            CreateProductRequest, CreatedProduct, ProductList, ProductWithSizes, SizeStockInput,
            SizeStockView, UpdateProductRequest,
        },
    },
    models::{MainCategory, Order, OrderItem, OrderStatus, Product, ProductStatus, SizeStock, User},
    response::{ApiResponse, Meta},
    routes::{auth, health, orders, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::accept_order,
        orders::complete_order,
    ),
    components(
        schemas(
            User,
            Product,
            SizeStock,
            Order,
            OrderItem,
            MainCategory,
            ProductStatus,
            OrderStatus,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            SizeStockInput,
            SizeStockView,
            CreateProductRequest,
            UpdateProductRequest,
            CreatedProduct,
            ProductWithSizes,
            ProductList,
            OrderItemInput,
            PlaceOrderRequest,
            PlacedOrder,
            OrderWithItems,
            OrderList,
            params::Pagination,
            params::SortOrder,
            params::OrderListQuery,
            Meta,
            ApiResponse<ProductWithSizes>,
            ApiResponse<ProductList>,
            ApiResponse<CreatedProduct>,
            ApiResponse<PlacedOrder>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Order>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Auth", description = "Authentication endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
