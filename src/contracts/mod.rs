// Contracts Module - Curve read-only ABIs

pub mod i_curve_address_provider;
pub mod i_curve_rate_provider;
pub mod i_curve_registry;

pub use i_curve_address_provider::ICurveAddressProvider;
pub use i_curve_rate_provider::ICurveRateProvider;
pub use i_curve_registry::ICurveRegistry;
