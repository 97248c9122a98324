//! Database entities. One module per table.

pub mod account;
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod delivery;
pub mod delivery_order;
pub mod driver_profile;
pub mod favorite;
pub mod notification;
pub mod order;
pub mod order_item;
pub mod otp;
pub mod password_reset_token;
pub mod payment;
pub mod product;
pub mod sequence;
pub mod shipping_address;
pub mod subcategory;
pub mod warehouse_profile;
