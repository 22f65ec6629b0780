//! Implementation of the `fsm_future!` macro.
//!
//! Parses a small DSL describing a state table (state functions, optional
//! unwind functions, a terminal `ret` function and optional flags) and
//! emits an `FsmDef` trait implementation for a generated marker type.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{
    Ident, LitBool, Path, Token, Type, Visibility,
    braced,
    parse::{Parse, ParseStream},
    parse2,
};

/// `state <index> = <path>;`
struct StateArm {
    index: syn::LitInt,
    func: Path,
}

impl Parse for StateArm {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        input.parse::<kw::state>()?;
        let index = input.parse()?;
        input.parse::<Token![=]>()?;
        let func = input.parse()?;
        input.parse::<Token![;]>()?;
        Ok(Self { index, func })
    }
}

/// `unwind <index> = <path>;`
struct UnwindArm {
    index: syn::LitInt,
    func: Path,
}

impl Parse for UnwindArm {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        input.parse::<kw::unwind>()?;
        let index = input.parse()?;
        input.parse::<Token![=]>()?;
        let func = input.parse()?;
        input.parse::<Token![;]>()?;
        Ok(Self { index, func })
    }
}

/// `ret = <path>;`
struct RetArm {
    func: Path,
}

impl Parse for RetArm {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        input.parse::<kw::ret>()?;
        input.parse::<Token![=]>()?;
        let func = input.parse()?;
        input.parse::<Token![;]>()?;
        Ok(Self { func })
    }
}

/// `flags(no_unwind = <bool>, no_abort = <bool>);`
struct FlagsArm {
    no_unwind: bool,
    no_abort: bool,
}

impl Parse for FlagsArm {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        input.parse::<kw::flags>()?;
        let content;
        syn::parenthesized!(content in input);
        let mut no_unwind = false;
        let mut no_abort = false;
        while !content.is_empty() {
            let key: Ident = content.parse()?;
            content.parse::<Token![=]>()?;
            let value: LitBool = content.parse()?;
            match key.to_string().as_str() {
                "no_unwind" => no_unwind = value.value,
                "no_abort" => no_abort = value.value,
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unknown fsm flag `{other}`, expected `no_unwind` or `no_abort`"),
                    ));
                }
            }
            if content.peek(Token![,]) {
                content.parse::<Token![,]>()?;
            }
        }
        input.parse::<Token![;]>()?;
        Ok(Self {
            no_unwind,
            no_abort,
        })
    }
}

enum BodyItem {
    State(StateArm),
    Unwind(UnwindArm),
    Ret(RetArm),
    Flags(FlagsArm),
}

impl Parse for BodyItem {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(kw::state) {
            Ok(Self::State(input.parse()?))
        } else if input.peek(kw::unwind) {
            Ok(Self::Unwind(input.parse()?))
        } else if input.peek(kw::ret) {
            Ok(Self::Ret(input.parse()?))
        } else if input.peek(kw::flags) {
            Ok(Self::Flags(input.parse()?))
        } else {
            Err(input.error("expected `state`, `unwind`, `ret`, or `flags`"))
        }
    }
}

/// `[pub] fsm Name: DataType -> OutputType { ...items... }`
struct FsmSpec {
    vis: Visibility,
    name: Ident,
    data_ty: Type,
    output_ty: Type,
    items: Vec<BodyItem>,
}

mod kw {
    syn::custom_keyword!(fsm);
    syn::custom_keyword!(state);
    syn::custom_keyword!(unwind);
    syn::custom_keyword!(ret);
    syn::custom_keyword!(flags);
}

impl Parse for FsmSpec {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let vis: Visibility = input.parse()?;
        input.parse::<kw::fsm>()?;
        let name: Ident = input.parse()?;
        input.parse::<Token![:]>()?;
        let data_ty: Type = input.parse()?;
        input.parse::<Token![->]>()?;
        let output_ty: Type = input.parse()?;

        let content;
        braced!(content in input);
        let mut items = Vec::new();
        while !content.is_empty() {
            items.push(content.parse()?);
        }

        Ok(Self {
            vis,
            name,
            data_ty,
            output_ty,
            items,
        })
    }
}

pub(crate) fn expand(input: TokenStream) -> syn::Result<TokenStream> {
    let spec: FsmSpec = parse2(input)?;

    let mut state_arms = Vec::new();
    let mut unwind_arms = Vec::new();
    let mut ret_func: Option<Path> = None;
    let mut no_unwind = false;
    let mut no_abort = false;

    for item in spec.items {
        match item {
            BodyItem::State(arm) => {
                let idx = arm.index;
                let func = arm.func;
                state_arms.push(quote! { #idx => #func(__fsm_data, __fsm_waker), });
            }
            BodyItem::Unwind(arm) => {
                let idx = arm.index;
                let func = arm.func;
                unwind_arms.push(quote! { #idx => #func(__fsm_data, __fsm_reason), });
            }
            BodyItem::Ret(arm) => {
                if ret_func.replace(arm.func).is_some() {
                    return Err(syn::Error::new(
                        spec.name.span(),
                        "fsm_future! declares `ret` more than once",
                    ));
                }
            }
            BodyItem::Flags(arm) => {
                no_unwind = arm.no_unwind;
                no_abort = arm.no_abort;
            }
        }
    }

    let ret_func = ret_func.ok_or_else(|| {
        syn::Error::new(spec.name.span(), "fsm_future! requires a `ret = <path>;` arm")
    })?;

    if state_arms.is_empty() {
        return Err(syn::Error::new(
            spec.name.span(),
            "fsm_future! requires at least one `state <index> = <path>;` arm",
        ));
    }

    let state_count = u32::try_from(state_arms.len()).expect("absurd number of fsm states");
    let vis = spec.vis;
    let name = spec.name;
    let future_alias = format_ident!("{}Future", name);
    let data_ty = spec.data_ty;
    let output_ty = spec.output_ty;

    Ok(quote! {
        #[doc(hidden)]
        #vis struct #name;

        impl ::fimo_runtime::future::fsm::FsmDef for #name {
            type Data = #data_ty;
            type Output = #output_ty;

            const STATE_COUNT: u32 = #state_count;
            const NO_UNWIND: bool = #no_unwind;
            const NO_ABORT: bool = #no_abort;

            fn poll_state(
                __fsm_state: u32,
                __fsm_data: &mut Self::Data,
                __fsm_waker: &::core::task::Waker,
            ) -> ::fimo_runtime::future::fsm::StateOutcome {
                match __fsm_state {
                    #(#state_arms)*
                    other => ::core::panic!("fsm state {other} out of range for {}", ::core::stringify!(#name)),
                }
            }

            fn unwind_state(
                __fsm_state: u32,
                __fsm_data: &mut Self::Data,
                __fsm_reason: ::fimo_runtime::future::fsm::UnwindReason,
            ) -> ::fimo_runtime::future::fsm::UnwindOutcome {
                match __fsm_state {
                    #(#unwind_arms)*
                    _ => ::fimo_runtime::future::fsm::UnwindOutcome::Ret,
                }
            }

            fn ret(__fsm_data: Self::Data) -> Self::Output {
                #ret_func(__fsm_data)
            }
        }

        #vis type #future_alias = ::fimo_runtime::future::fsm::FsmFuture<#name>;
    })
}
