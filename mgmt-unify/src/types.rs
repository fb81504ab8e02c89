//! Concrete types the unifier can resolve an expression to. Richer than
//! [`mgmt_resource::ValueType`] (which is a flat tag used at runtime) since unification
//! needs to reason about the shape of containers before any value exists.

use std::collections::BTreeMap;
use std::fmt;

use mgmt_resource::ValueType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Struct(BTreeMap<String, Type>),
    Func(Vec<Type>, Box<Type>),
}

impl Type {
    /// The runtime tag this type erases to, for handing a solved signature to
    /// `mgmt_fgraph::Signature`.
    pub fn value_type(&self) -> ValueType {
        match self {
            Type::Unit => ValueType::Unit,
            Type::Bool => ValueType::Bool,
            Type::Int => ValueType::Int,
            Type::Float => ValueType::Float,
            Type::Str => ValueType::Str,
            Type::List(_) => ValueType::List,
            Type::Map(..) => ValueType::Map,
            Type::Struct(_) => ValueType::Map,
            Type::Func(..) => ValueType::Map,
        }
    }
}

/// The exact `Type` a literal `Value` inhabits. Empty lists/maps type as `Unit`-keyed
/// containers, the least commitment the solver can make without more context; a `ListWrap`
/// or `MapWrap` invariant elsewhere will narrow it further if one applies.
pub fn value_literal_type(value: &mgmt_resource::Value) -> Type {
    use mgmt_resource::Value;
    match value {
        Value::Unit => Type::Unit,
        Value::Bool(_) => Type::Bool,
        Value::Int(_) => Type::Int,
        Value::Float(_) => Type::Float,
        Value::Str(_) => Type::Str,
        Value::List(items) => {
            let elem = items.first().map(value_literal_type).unwrap_or(Type::Unit);
            Type::List(Box::new(elem))
        }
        Value::Map(fields) => {
            let elem = fields.values().next().map(value_literal_type).unwrap_or(Type::Unit);
            Type::Map(Box::new(Type::Str), Box::new(elem))
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "unit"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "str"),
            Type::List(elem) => write!(f, "[{elem}]"),
            Type::Map(k, v) => write!(f, "{{{k}: {v}}}"),
            Type::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            Type::Func(args, ret) => {
                write!(f, "func(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ") {ret}")
            }
        }
    }
}
