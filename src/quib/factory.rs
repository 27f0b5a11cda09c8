use std::{
    collections::BTreeMap,
    ops::{Add, Div, Mul, Neg, Sub},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use super::{
    handler::{QuibHandler, QuibProps},
    Quib, QuibFuncCall,
};
use crate::{
    func::{functions::IQUIB, Arg, FuncCall, FuncDefinition, FUNCTION_REGISTRY},
    path::Index,
    project::Project,
    value::Value,
    QuibError,
};

static NEXT_QUIB_ID: AtomicU64 = AtomicU64::new(1);

impl Project {
    /// An input quib holding `value`.
    pub fn iquib(self: &Arc<Self>, value: impl Into<Value>) -> Quib {
        self.create_quib(FuncCall::new(builtin(IQUIB), vec![Arg::Value(value.into())], BTreeMap::new()))
    }

    /// A function quib calling `func`.
    pub fn call(
        self: &Arc<Self>,
        func: Arc<FuncDefinition>,
        args: Vec<Arg<Quib>>,
        kwargs: BTreeMap<String, Arg<Quib>>,
    ) -> Quib {
        self.create_quib(FuncCall::new(func, args, kwargs))
    }

    /// A function quib calling the registered function `name`.
    pub fn call_named(
        self: &Arc<Self>,
        name: &str,
        args: Vec<Arg<Quib>>,
        kwargs: BTreeMap<String, Arg<Quib>>,
    ) -> Result<Quib, QuibError> {
        Ok(self.call(FUNCTION_REGISTRY.lookup(name)?, args, kwargs))
    }

    fn create_quib(self: &Arc<Self>, func_call: QuibFuncCall) -> Quib {
        let id = NEXT_QUIB_ID.fetch_add(1, Ordering::Relaxed);
        let config = self.config();
        let is_iquib = func_call.func.name == IQUIB;
        let props = QuibProps {
            name: None,
            allow_overriding: if is_iquib {
                config.iquib_allow_overriding
            } else {
                config.function_quib_allow_overriding
            },
            assigned_quibs: None,
            template: None,
            cache_mode: config.cache_mode,
            graphics_update: None,
        };
        let handler = Arc::new(QuibHandler::new(id, self.clone(), func_call, props));
        for parent in handler.parents() {
            parent.0.add_child(&handler);
        }
        self.register(&handler);
        let quib = Quib(handler);
        tracing::debug!("Created {}", quib.pretty_repr());
        if !config.lazy && !is_iquib {
            if let Err(err) = quib.get_value() {
                tracing::warn!("Evaluating {quib} on creation failed: {err}");
            }
        }
        quib
    }
}

impl Quib {
    /// `self[index]`.
    pub fn getitem(&self, index: Index) -> Quib {
        self.apply_builtin("getitem", vec![Arg::Source(self.clone()), Arg::Value(index.to_value())])
    }

    /// `self[key]` for dictionaries and field arrays.
    pub fn getitem_key(&self, key: &str) -> Quib {
        self.apply_builtin("getitem", vec![Arg::Source(self.clone()), Arg::Value(Value::from(key))])
    }

    /// `self[index]` with the index itself a quib.
    pub fn getitem_quib(&self, index: &Quib) -> Quib {
        self.apply_builtin("getitem", vec![Arg::Source(self.clone()), Arg::Source(index.clone())])
    }

    /// Call the registered function `name` with this quib as the first argument.
    pub fn apply(&self, name: &str, mut args: Vec<Arg<Quib>>, kwargs: BTreeMap<String, Arg<Quib>>) -> Result<Quib, QuibError> {
        args.insert(0, Arg::Source(self.clone()));
        self.0.project.call_named(name, args, kwargs)
    }

    fn apply_builtin(&self, name: &str, args: Vec<Arg<Quib>>) -> Quib {
        self.0.project.call(builtin(name), args, BTreeMap::new())
    }
}

/// A registered function. Unknown names yield a function that fails when evaluated.
fn builtin(name: &str) -> Arc<FuncDefinition> {
    FUNCTION_REGISTRY.get(name).unwrap_or_else(|| {
        tracing::error!("Function '{name}' is not registered");
        let missing = name.to_string();
        FuncDefinition::custom(name, move |_, _| Err(QuibError::NotFound(format!("function '{missing}'")))).into_arc()
    })
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $func:literal) => {
        impl $trait<&Quib> for &Quib {
            type Output = Quib;

            fn $method(self, other: &Quib) -> Quib {
                self.apply_builtin($func, vec![Arg::Source(self.clone()), Arg::Source(other.clone())])
            }
        }

        impl $trait<f64> for &Quib {
            type Output = Quib;

            fn $method(self, other: f64) -> Quib {
                self.apply_builtin($func, vec![Arg::Source(self.clone()), Arg::from(other)])
            }
        }

        impl $trait<&Quib> for f64 {
            type Output = Quib;

            fn $method(self, other: &Quib) -> Quib {
                other.apply_builtin($func, vec![Arg::from(self), Arg::Source(other.clone())])
            }
        }
    };
}

binary_operator!(Add, add, "add");
binary_operator!(Sub, sub, "subtract");
binary_operator!(Mul, mul, "multiply");
binary_operator!(Div, div, "divide");

impl Neg for &Quib {
    type Output = Quib;

    fn neg(self) -> Quib {
        self.apply_builtin("negative", vec![Arg::Source(self.clone())])
    }
}
