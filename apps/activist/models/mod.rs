pub mod prices;
pub mod proposals;
