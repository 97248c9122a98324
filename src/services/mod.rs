// Identity and accounts
pub mod identity;

// Catalog
pub mod catalog;

// Customer
pub mod addresses;
pub mod cart;
pub mod favorites;
pub mod orders;
pub mod payments;

// Fulfilment
pub mod deliveries;
pub mod delivery_status;
pub mod warehouses;

// Cross-cutting
pub mod notifications;
pub mod sequences;
