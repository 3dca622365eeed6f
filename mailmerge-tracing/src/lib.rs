extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{ItemFn, Stmt, parse::Parse, parse_macro_input, parse_quote};

/// How the elapsed time of a traced function is rendered in its exit event.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
enum Precision {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
    Unspecified,
}

impl Precision {
    /// A closure expression rendering a `Duration` for the `elapsed` field
    fn formatter(self) -> syn::Expr {
        match self {
            Self::Nanos => {
                parse_quote!(|d: std::time::Duration| format!("{} ns", d.as_nanos()))
            }
            Self::Micros => {
                parse_quote!(|d: std::time::Duration| format!("{} us", d.as_micros()))
            }
            Self::Millis => {
                parse_quote!(|d: std::time::Duration| format!("{} ms", d.as_millis()))
            }
            Self::Seconds => {
                parse_quote!(|d: std::time::Duration| format!("{} s", d.as_secs()))
            }
            Self::Unspecified => parse_quote!(|_: std::time::Duration| String::default()),
        }
    }
}

impl From<&str> for Precision {
    fn from(value: &str) -> Self {
        match value {
            "ns" | "nano" | "nanos" | "nanoseconds" => Self::Nanos,
            "us" | "micro" | "micros" | "microseconds" => Self::Micros,
            "ms" | "milli" | "millis" | "milliseconds" => Self::Millis,
            "s" | "sec" | "secs" | "seconds" => Self::Seconds,
            _ => Self::Unspecified,
        }
    }
}

impl Parse for Precision {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        if !input.peek(syn::token::Paren) {
            return Ok(Self::default());
        }

        let content;
        let _ = syn::parenthesized!(content in input);
        let _ = content.parse::<keywords::precision>()?;
        let _ = content.parse::<syn::Token![=]>()?;
        let precision = content.parse::<syn::LitStr>()?.value();

        Ok(Self::from(precision.as_str()))
    }
}

mod keywords {
    syn::custom_keyword!(timing);
    syn::custom_keyword!(precision);
    syn::custom_keyword!(instrument);
    syn::custom_keyword!(level);
}

/// Level of the entry and exit events
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
enum Level {
    #[default]
    Trace,
    Debug,
    Info,
}

impl Level {
    fn tokens(self) -> TokenStream {
        match self {
            Self::Trace => quote!(tracing::Level::TRACE),
            Self::Debug => quote!(tracing::Level::DEBUG),
            Self::Info => quote!(tracing::Level::INFO),
        }
    }
}

impl TryFrom<&syn::LitStr> for Level {
    type Error = syn::Error;

    fn try_from(value: &syn::LitStr) -> Result<Self, Self::Error> {
        match value.value().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(syn::Error::new(
                value.span(),
                format!("unknown level `{other}`, expected trace, debug or info"),
            )),
        }
    }
}

#[derive(Default)]
struct Attributes {
    timing: Option<Precision>,
    instrument: Option<TokenStream>,
    level: Option<Level>,
    warnings: Vec<syn::Error>,
}

impl Attributes {
    /// Unknown arguments are reported as deprecation warnings rather than
    /// hard errors, so a typo never breaks the build of the traced crate.
    fn warnings(&self) -> TokenStream {
        let warnings = self.warnings.iter().map(|err| {
            let msg = format!("found unrecognized input, {err}");
            let msg = syn::LitStr::new(&msg, err.span());

            quote_spanned! {err.span()=>
                #[warn(deprecated)]
                {
                    #[deprecated(since = "not actually deprecated", note = #msg)]
                    const TRACED_ARGUMENT_WARNING: () = ();
                    let _ = TRACED_ARGUMENT_WARNING;
                }
            }
        });

        quote! {
            { #(#warnings)* }
        }
    }

    fn enter_event(&self, id: &str) -> Stmt {
        let level = self.level.unwrap_or_default().tokens();
        parse_quote! { tracing::event!(#level, function = #id, "OnEnter"); }
    }

    fn exit_event(&self, id: &str) -> Stmt {
        let level = self.level.unwrap_or_default().tokens();

        match self.timing {
            None => parse_quote! { tracing::event!(#level, function = #id, "OnExit"); },
            Some(precision) => {
                let formatter = precision.formatter();
                parse_quote! {
                    tracing::event!(
                        #level,
                        function = #id,
                        elapsed = %(#formatter)(self.timer.elapsed()),
                        "OnExit"
                    );
                }
            }
        }
    }
}

impl Parse for Attributes {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut attributes = Self::default();

        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(keywords::timing) {
                if attributes.timing.is_some() {
                    return Err(input.error("expected only a single `timing` argument"));
                }

                let _ = input.parse::<keywords::timing>()?;
                attributes.timing = Some(input.parse()?);
            } else if lookahead.peek(keywords::instrument) {
                if attributes.instrument.is_some() {
                    return Err(input.error("expected only a single `instrument` argument"));
                }

                let _ = input.parse::<keywords::instrument>()?;
                attributes.instrument = Some(if input.peek(syn::token::Paren) {
                    let content;
                    let _ = syn::parenthesized!(content in input);
                    content.parse()?
                } else {
                    TokenStream::new()
                });
            } else if lookahead.peek(keywords::level) {
                if attributes.level.is_some() {
                    return Err(input.error("expected only a single `level` argument"));
                }

                let _ = input.parse::<keywords::level>()?;
                let _ = input.parse::<syn::Token![=]>()?;
                let literal = input.parse::<syn::LitStr>()?;
                match Level::try_from(&literal) {
                    Ok(level) => attributes.level = Some(level),
                    Err(err) => attributes.warnings.push(err),
                }
            } else if lookahead.peek(syn::Token![,]) {
                let _ = input.parse::<syn::Token![,]>()?;
            } else {
                attributes.warnings.push(lookahead.error());
                let _ = input.parse::<proc_macro2::TokenTree>();
            }
        }

        Ok(attributes)
    }
}

/// Emits `OnEnter`/`OnExit` events, with the function name in a `function`
/// field, when the attributed function is entered and when it returns. The
/// exit event fires from a drop guard, so early returns and an `async fn`
/// dropped part way (a cancelled send, say) are covered too.
///
/// Arguments:
/// - `instrument(...)`: forwarded verbatim to `#[tracing::instrument(...)]`
/// - `timing(precision = "ms")`: add an `elapsed` field to the exit event
/// - `level = "debug"`: level of both events (`trace`, `debug` or `info`;
///   defaults to `trace`)
///
/// The calling crate must have `tracing` in scope as a dependency.
///
/// # Panics
///
/// When applied to anything other than a function.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = parse_macro_input!(args as Attributes);
    let mut item_fn = parse_macro_input!(item as ItemFn);

    item_fn
        .attrs
        .push(parse_quote! { #[allow(clippy::items_after_statements)] });

    if let Some(fields) = &args.instrument {
        item_fn
            .attrs
            .push(parse_quote! { #[tracing::instrument(#fields)] });
    }

    let id = item_fn.sig.ident.to_string();
    let warnings = args.warnings();
    let enter = args.enter_event(&id);
    let exit = args.exit_event(&id);

    let guard: Vec<Stmt> = parse_quote! {
        struct __Traced {
            timer: std::time::Instant,
        }

        impl __Traced {
            fn enter() -> Self {
                #warnings

                #enter
                __Traced {
                    timer: std::time::Instant::now(),
                }
            }
        }

        impl std::ops::Drop for __Traced {
            fn drop(&mut self) {
                let _ = self.timer;
                #exit
            }
        }

        let __traced = __Traced::enter();
    };

    let body = std::mem::take(&mut item_fn.block.stmts);
    item_fn.block.stmts = guard.into_iter().chain(body).collect();

    quote! { #item_fn }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &str) -> Attributes {
        match syn::parse_str::<Attributes>(args) {
            Ok(attributes) => attributes,
            Err(err) => panic!("failed to parse `{args}`: {err}"),
        }
    }

    #[test]
    fn test_defaults() {
        let attributes = parse("");

        assert_eq!(attributes.timing, None);
        assert_eq!(attributes.level, None);
        assert!(attributes.instrument.is_none());
        assert!(attributes.warnings.is_empty());
    }

    #[test]
    fn test_all_arguments() {
        let attributes =
            parse(r#"instrument(skip_all, err), timing(precision = "ms"), level = "DEBUG""#);

        assert_eq!(attributes.timing, Some(Precision::Millis));
        assert_eq!(attributes.level, Some(Level::Debug));
        let instrument = attributes.instrument.map(|tokens| tokens.to_string());
        assert!(instrument.is_some_and(|tokens| tokens.contains("skip_all")));
    }

    #[test]
    fn test_timing_without_precision_is_nanos() {
        assert_eq!(parse("timing").timing, Some(Precision::Nanos));
        assert_eq!(
            parse(r#"timing(precision = "fortnights")"#).timing,
            Some(Precision::Unspecified)
        );
    }

    #[test]
    fn test_unknown_input_becomes_warning() {
        let attributes = parse(r#"level = "loud", verbose"#);

        assert_eq!(attributes.level, None);
        assert_eq!(attributes.warnings.len(), 2);
    }

    #[test]
    fn test_repeated_argument_is_an_error() {
        assert!(syn::parse_str::<Attributes>(r#"level = "info", level = "debug""#).is_err());
        assert!(syn::parse_str::<Attributes>("timing, timing").is_err());
    }
}
