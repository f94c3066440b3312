//! Resource type definitions
//!
//! Each type's schema comes from the struct its attributes convert into, so
//! the schema the host validates against and the one the provider converts
//! with cannot drift apart.

use fastly_core::attrs::FromAttributes;
use fastly_core::provider::ResourceType;
use fastly_core::schema::ResourceSchema;

use crate::package_hash::PackageHashConfig;
use crate::service::ServiceVcl;
use crate::tls::{TlsCertificate, TlsSubscription, TlsSubscriptionValidation};

pub const PACKAGE_HASH: &str = "package_hash";

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $config:ty) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                <$config as FromAttributes>::schema()
            }
        }
    };
    ($name:ident, $type_name:expr, $config:ty, data_source) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                <$config as FromAttributes>::schema()
            }
            fn is_data_source(&self) -> bool {
                true
            }
        }
    };
}

define_resource_type!(ServiceVclType, crate::service::RESOURCE_TYPE, ServiceVcl);
define_resource_type!(
    TlsCertificateType,
    crate::tls::certificate::RESOURCE_TYPE,
    TlsCertificate
);
define_resource_type!(
    TlsSubscriptionType,
    crate::tls::subscription::RESOURCE_TYPE,
    TlsSubscription
);
define_resource_type!(
    TlsSubscriptionValidationType,
    crate::tls::validation::RESOURCE_TYPE,
    TlsSubscriptionValidation
);
define_resource_type!(PackageHashType, PACKAGE_HASH, PackageHashConfig, data_source);

/// Returns all resource types and data sources supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(ServiceVclType),
        Box::new(TlsCertificateType),
        Box::new(TlsSubscriptionType),
        Box::new(TlsSubscriptionValidationType),
        Box::new(PackageHashType),
    ]
}
