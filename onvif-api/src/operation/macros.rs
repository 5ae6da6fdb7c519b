//! Declarative macro for ONVIF operation definitions

/// Define an operation type binding a request and response to a service.
///
/// # Example
/// ```rust,ignore
/// define_onvif_operation! {
///     operation: GetProfiles,
///     service: Media,
///     request: Empty,
///     response: GetProfilesResponse,
/// }
/// ```
///
/// The action name defaults to the operation's identifier; pass
/// `action: "Name"` to override it. `namespace:`/`prefix:` override the
/// element namespace for operations borrowed from another WSDL.
#[macro_export]
macro_rules! define_onvif_operation {
    (
        $(#[$meta:meta])*
        operation: $op:ident,
        $(action: $action:literal,)?
        service: $service:ident,
        $(namespace: $namespace:expr, prefix: $prefix:literal,)?
        request: $request:ty,
        response: $response:ty $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $op;

        impl $crate::operation::OnvifOperation for $op {
            type Request = $request;
            type Response = $response;

            const SERVICE: $crate::service::Service = $crate::service::Service::$service;
            const ACTION: &'static str = $crate::define_onvif_operation!(@action $op $(, $action)?);

            $(
                fn namespace() -> &'static str {
                    $namespace
                }

                fn prefix() -> &'static str {
                    $prefix
                }
            )?
        }
    };

    (@action $op:ident) => {
        stringify!($op)
    };
    (@action $op:ident, $action:literal) => {
        $action
    };
}
