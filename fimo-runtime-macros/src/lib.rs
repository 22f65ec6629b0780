//! Proc macros for `fimo-runtime`'s `FsmFuture` state machines.
//!
//! The runtime's async subsystem expresses multi-step, poll-driven
//! operations as finite-state machines (see `fimo_runtime::future::fsm`)
//! rather than as hand-written `Future` impls. Writing the boilerplate
//! `FsmDef` trait impl by hand for every state machine is repetitive and
//! easy to get wrong (state indices drift out of sync with the `match`
//! arms). `fsm_future!` generates that impl from a small declarative
//! description of the state table.

mod fsm;

use proc_macro::TokenStream;

/// Generates an `FsmDef` implementation and a `Future`-ready type alias from
/// a state table declaration.
///
/// ```ignore
/// fsm_future! {
///     pub fsm Handshake: HandshakeData -> Result<Accepted, RejectReason> {
///         state 0 = read_name;
///         state 1 = read_version;
///         unwind 0 = unwind_read_name;
///         unwind 1 = unwind_read_version;
///         ret = finish;
///     }
/// }
/// ```
///
/// expands (roughly) to a marker type `Handshake` implementing
/// `fimo_runtime::future::fsm::FsmDef` plus a type alias
/// `HandshakeFuture = fimo_runtime::future::fsm::FsmFuture<Handshake>`.
#[proc_macro]
pub fn fsm_future(input: TokenStream) -> TokenStream {
    fsm::expand(input.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
