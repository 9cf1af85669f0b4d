//! Statement catalogue.
//!
//! Every fixed statement the repositories issue lives here, so the text a
//! test double matches on is the text production sends. Search statements
//! are assembled from [`crate::filters`] at call time.

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

pub const PRODUCT_COLUMNS: &str = "id, name, description, price, stock, created_at, updated_at";

pub const INSERT_PRODUCT: &str = "insert into products (name, description, price, stock) \
     values ($1, $2, $3, $4) returning id";

pub const SELECT_PRODUCT_BY_ID: &str =
    "select id, name, description, price, stock, created_at, updated_at from products where id = $1";

/// Row-level exclusive lock; only meaningful inside a transaction.
pub const LOCK_PRODUCT_BY_ID: &str = "select id, name, description, price, stock, created_at, updated_at \
     from products where id = $1 for update";

pub const UPDATE_PRODUCT: &str = "update products \
     set name = $2, description = $3, price = $4, stock = $5, updated_at = now() \
     where id = $1";

pub const DEBIT_STOCK: &str =
    "update products set stock = stock - $2, updated_at = now() where id = $1 returning stock";

pub const CREDIT_STOCK: &str =
    "update products set stock = stock + $2, updated_at = now() where id = $1 returning stock";

pub const COUNT_ACTIVE_ORDER_REFS: &str = "select count(*) as n \
     from order_items oi join orders o on o.id = oi.order_id \
     where oi.product_id = $1 and o.status in ('pending', 'processing')";

pub const COUNT_ORDER_REFS: &str = "select count(*) as n from order_items where product_id = $1";

pub const DELETE_PRODUCT: &str = "delete from products where id = $1";

pub const COUNT_PRODUCTS: &str = "select count(*) as n from products";

pub const SELECT_PRODUCTS_PAGE: &str = "select id, name, description, price, stock, created_at, updated_at \
     from products order by created_at desc, id desc limit $1 offset $2";

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub const ORDER_COLUMNS: &str = "id, customer_name, status, created_at, updated_at";

pub const INSERT_ORDER: &str =
    "insert into orders (customer_name, status) values ($1, $2) returning id";

pub const INSERT_ORDER_ITEM: &str = "insert into order_items (order_id, product_id, quantity, unit_price_at_order) \
     values ($1, $2, $3, $4)";

pub const SELECT_ORDER_BY_ID: &str =
    "select id, customer_name, status, created_at, updated_at from orders where id = $1";

/// Lines joined to the product as it is now; `total_price` uses the current price.
pub const SELECT_ORDER_LINES: &str = "select oi.product_id, p.name, p.price, oi.unit_price_at_order, oi.quantity, \
     (p.price * oi.quantity) as total_price \
     from order_items oi join products p on p.id = oi.product_id \
     where oi.order_id = $1 order by oi.product_id";

pub const LOCK_ORDER_STATUS: &str = "select status from orders where id = $1 for update";

pub const UPDATE_ORDER_STATUS: &str =
    "update orders set status = $2, updated_at = now() where id = $1";

pub const SELECT_ORDER_ITEMS: &str =
    "select product_id, quantity from order_items where order_id = $1";

pub const DELETE_ORDER_ITEMS: &str = "delete from order_items where order_id = $1";

pub const DELETE_ORDER: &str = "delete from orders where id = $1";

pub const ORDER_TOTAL: &str = "select sum(p.price * oi.quantity) as total \
     from order_items oi join products p on p.id = oi.product_id \
     where oi.order_id = $1";

pub const COUNT_ORDERS: &str = "select count(*) as n from orders";

pub const SELECT_ORDERS_PAGE: &str = "select id, customer_name, status, created_at, updated_at \
     from orders order by created_at desc, id desc limit $1 offset $2";
