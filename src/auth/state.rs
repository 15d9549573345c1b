//! Authentication state trait and macro.

use crate::jwt::TokenVerifier;

/// Trait for router state types that can verify tokens.
pub trait HasAuthBackend {
    fn verifier(&self) -> &TokenVerifier;
}

/// Implement `HasAuthBackend` for a state struct with a
/// `verifier: TokenVerifier` field.
///
/// # Example
/// ```ignore
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub verifier: TokenVerifier,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn verifier(&self) -> &$crate::jwt::TokenVerifier {
                &self.verifier
            }
        }
    };
}
