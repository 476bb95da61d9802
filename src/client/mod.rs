pub mod payment;

pub use payment::PaymentClient;
