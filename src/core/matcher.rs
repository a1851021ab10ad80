//! Argument matching: bind dispatch values to a subscriber's declared parameters.
//!
//! Subscribers declare their parameters up front through a [`Signature`]
//! (ordered names, each required or defaulted). For one call:
//!
//! 1. every declared name present in `named` is bound from `named`
//! 2. required names still unbound take the next unused positional value,
//!    in declaration order
//! 3. a required name left unbound fails with [`DispatchError::Unsatisfied`]
//!
//! The handler receives only the bound map; extra named values are dropped.

use log::trace;
use std::sync::Arc;

use crate::entities::{AttrValue, Attrs};

/// Declared parameter of a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub required: bool,
}

/// Subscriber signature: a display name plus ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    name: String,
    params: Vec<Param>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter without default value.
    pub fn required(mut self, param: impl Into<String>) -> Self {
        self.params.push(Param {
            name: param.into(),
            required: true,
        });
        self
    }

    /// Append a parameter with a default (handler decides the default).
    pub fn optional(mut self, param: impl Into<String>) -> Self {
        self.params.push(Param {
            name: param.into(),
            required: false,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Required parameters in declaration order
    pub fn required_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.required)
    }
}

/// Dispatch and subscription errors
#[derive(Debug)]
pub enum DispatchError {
    /// Required parameter found neither in named nor positional values
    Unsatisfied { param: String, subscriber: String },
    /// Subscriber itself failed
    Handler { subscriber: String, source: anyhow::Error },
    /// Unsubscribe of a subscriber that is not registered
    NotSubscribed { subscriber: String },
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Unsatisfied { param, subscriber } => {
                write!(f, "{} is not optional to call subscriber: {}", param, subscriber)
            }
            DispatchError::Handler { subscriber, source } => {
                write!(f, "Subscriber {} failed: {}", subscriber, source)
            }
            DispatchError::NotSubscribed { subscriber } => {
                write!(f, "Subscriber {} is not subscribed", subscriber)
            }
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Handler { source, .. } => {
                let err: &(dyn std::error::Error + 'static) = &**source;
                Some(err)
            }
            _ => None,
        }
    }
}

/// Event subscriber: declared signature + body receiving bound arguments.
pub trait Handler: Send + Sync {
    fn signature(&self) -> &Signature;
    fn call(&self, args: &Attrs) -> anyhow::Result<()>;
}

/// Shared subscriber; identity is the allocation.
pub type Subscriber = Arc<dyn Handler>;

/// Closure-backed handler
pub struct FnHandler<F> {
    signature: Signature,
    func: F,
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Attrs) -> anyhow::Result<()> + Send + Sync,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, args: &Attrs) -> anyhow::Result<()> {
        (self.func)(args)
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler")
            .field("signature", &self.signature)
            .finish()
    }
}

/// Wrap a closure into a subscriber.
///
/// # Example
/// ```ignore
/// let on_click = handler(Signature::new("on_click").required("x").optional("y"), |args| {
///     println!("x={:?}", args.get("x"));
///     Ok(())
/// });
/// ```
pub fn handler<F>(signature: Signature, func: F) -> Subscriber
where
    F: Fn(&Attrs) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler { signature, func })
}

/// Compute the argument map a subscriber with `signature` is called with.
pub fn match_params(
    signature: &Signature,
    positional: &[AttrValue],
    named: &Attrs,
) -> Result<Attrs, DispatchError> {
    let mut bound = Attrs::new();
    for param in signature.params() {
        if let Some(value) = named.get(&param.name) {
            bound.set(param.name.clone(), value.clone());
        }
    }

    let mut unused = positional.iter();
    for param in signature.required_params() {
        if bound.contains(&param.name) {
            continue;
        }
        match unused.next() {
            Some(value) => bound.set(param.name.clone(), value.clone()),
            None => {
                return Err(DispatchError::Unsatisfied {
                    param: param.name.clone(),
                    subscriber: signature.name().to_string(),
                });
            }
        }
    }

    Ok(bound)
}

/// Call `subscriber` with the subset of values its signature asks for.
pub fn call_matching_params(
    subscriber: &dyn Handler,
    positional: &[AttrValue],
    named: &Attrs,
) -> Result<(), DispatchError> {
    let signature = subscriber.signature();
    let args = match_params(signature, positional, named)?;
    trace!("Calling {} with {:?}", signature.name(), args.keys_sorted());
    subscriber
        .call(&args)
        .map_err(|source| DispatchError::Handler {
            subscriber: signature.name().to_string(),
            source,
        })
}
