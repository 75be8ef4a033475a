pub mod profile;
pub mod voucher;
