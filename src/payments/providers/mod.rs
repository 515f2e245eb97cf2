pub mod pakasir;
pub mod qrispw;

pub use pakasir::PakasirGateway;
pub use qrispw::QrispwGateway;
