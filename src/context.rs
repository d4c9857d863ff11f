//! Execution context facility.
//!
//! A [`Context`] represents one logical unit of application work — an inbound
//! request, a queued task, a scheduled job — that database activity is
//! attributed to. Contexts are cheap to clone, safe to share across the
//! threads a unit of work fans out to, and carry a typed key/value store
//! that interceptors use to attach per-context state.
//!
//! Execution is wrapped by an ordered [`InterceptorChain`]: each
//! [`ContextInterceptor`] receives the context and a continuation and decides
//! what to do around it. Interceptors that need "finally" semantics use an
//! RAII guard so their exit work runs even when the unit of work panics.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;

/// Identity used for everything that happened outside a named entry point.
pub const GENERIC: &str = "Generic";

thread_local! {
    static CURRENT: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

type ValueMap = DashMap<&'static str, Arc<dyn Any + Send + Sync>>;

#[derive(Clone)]
struct ContextInner {
    group: String,
    name: String,
    owner: String,
    entry_point: bool,
    parent: Option<Context>,
    values: ValueMap,
}

/// A scoped, possibly nested, execution-lifetime object.
///
/// The context attached to the calling thread is available through
/// [`Context::current`]. Value lookups walk up the parent chain, so nested
/// sub-contexts see state attached by the entry point that spawned them.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a root context marked as a new entry point.
    ///
    /// The owner defaults to [`GENERIC`]; see [`Context::with_owner`].
    pub fn new_entry_point(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                group: group.into(),
                name: name.into(),
                owner: GENERIC.to_string(),
                entry_point: true,
                parent: None,
                values: DashMap::new(),
            }),
        }
    }

    /// Create a nested sub-context inheriting this context's identity.
    pub fn sub_context(&self) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                group: self.inner.group.clone(),
                name: self.inner.name.clone(),
                owner: self.inner.owner.clone(),
                entry_point: false,
                parent: Some(self.clone()),
                values: DashMap::new(),
            }),
        }
    }

    /// Create a nested sub-context that starts a new entry point.
    pub fn sub_entry_point(&self, group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                group: group.into(),
                name: name.into(),
                owner: self.inner.owner.clone(),
                entry_point: true,
                parent: Some(self.clone()),
                values: DashMap::new(),
            }),
        }
    }

    /// Set the owning team of this entry point.
    ///
    /// Only meaningful before the context is shared or attached.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).owner = owner.into();
        self
    }

    /// The context attached to the calling thread, if any.
    pub fn current() -> Option<Context> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }

    /// Entry-point group, e.g. "Web" or "Jobs".
    pub fn group(&self) -> &str {
        &self.inner.group
    }

    /// Entry-point name, e.g. the route or job name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Owning team of the entry point.
    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    /// Whether this context starts a new entry point.
    pub fn is_entry_point(&self) -> bool {
        self.inner.entry_point
    }

    /// Attach a typed value to this context.
    pub fn put<T: Any + Send + Sync>(&self, key: &'static str, value: T) {
        self.inner.values.insert(key, Arc::new(value));
    }

    /// Remove a value from this context (not from parents).
    pub fn remove(&self, key: &str) {
        self.inner.values.remove(key);
    }

    /// Look up a typed value, walking up the parent chain.
    ///
    /// Returns `None` when the key is absent or holds a different type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let mut context = Some(self);
        while let Some(c) = context {
            if let Some(value) = c.inner.values.get(key) {
                return Arc::downcast::<T>(value.value().clone()).ok();
            }
            context = c.inner.parent.as_ref();
        }
        None
    }

    /// Make this context current for the calling thread until the returned
    /// guard is dropped.
    ///
    /// Clone the context and attach it from every thread a unit of work fans
    /// out to; counters accumulated there land in the same context state.
    pub fn attach(&self) -> ContextScope {
        CURRENT.with(|stack| stack.borrow_mut().push(self.clone()));
        ContextScope {
            _not_send: PhantomData,
        }
    }

    /// Run `f` attached to this context, wrapped by the interceptor chain.
    pub fn execute<R>(&self, chain: &InterceptorChain, f: impl FnOnce() -> R) -> R {
        chain.execute(self, f)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("group", &self.inner.group)
            .field("name", &self.inner.name)
            .field("owner", &self.inner.owner)
            .field("entry_point", &self.inner.entry_point)
            .finish()
    }
}

/// Guard returned by [`Context::attach`]; detaches on drop.
///
/// Deliberately `!Send`: a scope belongs to the thread that opened it.
pub struct ContextScope {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Pluggable cross-cutting behavior around a unit of work.
///
/// Implementations must call `next` exactly once; the chain is composed via
/// continuation passing, so an interceptor wraps everything downstream of it.
/// Skipping `next` does not short-circuit: the unit of work would silently
/// never run, so [`InterceptorChain::execute`] treats it as a programming
/// error and panics. Interceptors that want to gate execution opt out via
/// [`ContextInterceptor::applies`] instead.
/// Exit work that must survive a panicking unit of work belongs in a guard
/// dropped after `next` returns or unwinds.
pub trait ContextInterceptor: Send + Sync {
    /// Whether this interceptor participates for the given context.
    fn applies(&self, context: &Context) -> bool {
        let _ = context;
        true
    }

    /// Wrap the downstream chain.
    fn intercept(&self, context: &Context, next: &mut dyn FnMut());
}

/// An explicit, ordered list of interceptors wrapping unit-of-work execution.
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn ContextInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; earlier additions wrap later ones.
    pub fn add(mut self, interceptor: Arc<dyn ContextInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Run `f` attached to `context`, wrapped by every applicable
    /// interceptor in order.
    ///
    /// # Panics
    ///
    /// Panics when an interceptor fails to invoke its continuation, or
    /// invokes it more than once.
    pub fn execute<R>(&self, context: &Context, f: impl FnOnce() -> R) -> R {
        let _scope = context.attach();

        let applicable: Vec<Arc<dyn ContextInterceptor>> = self
            .interceptors
            .iter()
            .filter(|i| i.applies(context))
            .cloned()
            .collect();

        let mut f = Some(f);
        let mut result = None;
        {
            let mut terminal = || {
                let f = f.take().expect("unit of work invoked twice by an interceptor");
                result = Some(f());
            };
            run_chain(&applicable, context, &mut terminal);
        }
        match result {
            Some(r) => r,
            None => panic!("an interceptor did not invoke the rest of the chain"),
        }
    }
}

fn run_chain(
    interceptors: &[Arc<dyn ContextInterceptor>],
    context: &Context,
    terminal: &mut dyn FnMut(),
) {
    match interceptors.split_first() {
        None => terminal(),
        Some((first, rest)) => {
            let mut next = || run_chain(rest, context, terminal);
            first.intercept(context, &mut next);
        }
    }
}
