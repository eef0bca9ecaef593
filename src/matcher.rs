//! Signature matcher: pure type-compatibility decisions.
//!
//! Everything here is stateless. A [`TypeToken`] captures the identity of a
//! Rust type together with the identity of its `Option` form, which is what
//! lets the matcher treat `T` and `Option<T>` as compatible (the
//! nullable/value variance rule) without any runtime reflection.
//!
//! Because every handler operation is normalized at registration time into
//! "produces a future of its declared response type", the declared response
//! token is always the already-unwrapped type: the "unwrap the async wrapper
//! and retry" rule is satisfied structurally rather than by inspection. An
//! async operation that produces no value declares `()` and therefore only
//! matches a `()` ("void") response query.

use std::any::{type_name, TypeId};

/// Sentinel request type for zero-parameter operations.
///
/// An operation registered against `NoRequest` matches only a send whose
/// request value is `NoRequest`; it never matches any other request type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoRequest;

/// Captured identity of a request or response type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeToken {
    id: TypeId,
    /// `TypeId` of `Option<T>` for the captured `T`.
    wrapped: TypeId,
    name: &'static str,
}

impl TypeToken {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            wrapped: TypeId::of::<Option<T>>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn wrapped(&self) -> TypeId {
        self.wrapped
    }
}

/// Does an operation parameter of type `param` accept a request of type
/// `request`? Equal types match; so do `T` against `Option<T>` in either
/// direction. `Option<Option<T>>` chains are deliberately not flattened.
pub fn accepts(param: &TypeToken, request: &TypeToken) -> bool {
    param.id == request.id || param.id == request.wrapped || param.wrapped == request.id
}

/// Does an operation with declared response type `declared` satisfy a query
/// for `wanted`? Same compatibility rule as [`accepts`].
pub fn replies_with(declared: &TypeToken, wanted: &TypeToken) -> bool {
    declared.id == wanted.id || declared.id == wanted.wrapped || declared.wrapped == wanted.id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_types_match() {
        assert!(accepts(&TypeToken::of::<i32>(), &TypeToken::of::<i32>()));
        assert!(replies_with(&TypeToken::of::<String>(), &TypeToken::of::<String>()));
    }

    #[test]
    fn option_variance_is_symmetric() {
        let plain = TypeToken::of::<i32>();
        let optional = TypeToken::of::<Option<i32>>();
        assert!(accepts(&optional, &plain));
        assert!(accepts(&plain, &optional));
        assert!(replies_with(&optional, &plain));
        assert!(replies_with(&plain, &optional));
    }

    #[test]
    fn unrelated_types_do_not_match() {
        assert!(!accepts(&TypeToken::of::<i32>(), &TypeToken::of::<u32>()));
        assert!(!accepts(&TypeToken::of::<i32>(), &TypeToken::of::<Option<u32>>()));
        assert!(!replies_with(&TypeToken::of::<String>(), &TypeToken::of::<()>()));
    }

    #[test]
    fn double_option_is_not_flattened() {
        let plain = TypeToken::of::<i32>();
        let doubled = TypeToken::of::<Option<Option<i32>>>();
        assert!(!accepts(&doubled, &plain));
        assert!(!accepts(&plain, &doubled));
    }

    #[test]
    fn no_request_sentinel_only_matches_itself() {
        let sentinel = TypeToken::of::<NoRequest>();
        assert!(accepts(&sentinel, &TypeToken::of::<NoRequest>()));
        assert!(!accepts(&sentinel, &TypeToken::of::<()>()));
        assert!(!accepts(&sentinel, &TypeToken::of::<i32>()));
    }

    #[test]
    fn unit_response_matches_void_queries_only() {
        let void = TypeToken::of::<()>();
        assert!(replies_with(&void, &TypeToken::of::<()>()));
        assert!(!replies_with(&void, &TypeToken::of::<String>()));
    }
}
