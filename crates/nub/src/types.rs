use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Any,
}

impl PrimitiveKind {
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveKind::I8
                | PrimitiveKind::I16
                | PrimitiveKind::I32
                | PrimitiveKind::I64
                | PrimitiveKind::U8
                | PrimitiveKind::U16
                | PrimitiveKind::U32
                | PrimitiveKind::U64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveKind::I8 | PrimitiveKind::I16 | PrimitiveKind::I32 | PrimitiveKind::I64
        )
    }

    pub fn is_fp(self) -> bool {
        matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integral() || self.is_fp()
    }

    // width of the value in bits, strings / any are pointer sized
    pub fn bits(self) -> u32 {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::I8 | PrimitiveKind::U8 => 8,
            PrimitiveKind::I16 | PrimitiveKind::U16 => 16,
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => 32,
            PrimitiveKind::I64
            | PrimitiveKind::U64
            | PrimitiveKind::F64
            | PrimitiveKind::String
            | PrimitiveKind::Any => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::String => "string",
            PrimitiveKind::Any => "any",
        }
    }
}

/// Closed value type of the language. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Primitive(PrimitiveKind),
    Struct(String),
    Array(Box<Type>),
    Pointer(Box<Type>),
}

impl Type {
    pub const BOOL: Type = Type::Primitive(PrimitiveKind::Bool);
    pub const I32: Type = Type::Primitive(PrimitiveKind::I32);
    pub const I64: Type = Type::Primitive(PrimitiveKind::I64);
    pub const U64: Type = Type::Primitive(PrimitiveKind::U64);
    pub const F32: Type = Type::Primitive(PrimitiveKind::F32);
    pub const F64: Type = Type::Primitive(PrimitiveKind::F64);
    pub const STRING: Type = Type::Primitive(PrimitiveKind::String);
    pub const ANY: Type = Type::Primitive(PrimitiveKind::Any);

    pub fn array_of(inner: Type) -> Type {
        Type::Array(Box::new(inner))
    }

    pub fn pointer_to(base: Type) -> Type {
        Type::Pointer(Box::new(base))
    }

    pub fn named(name: impl Into<String>) -> Type {
        Type::Struct(name.into())
    }

    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.primitive().is_some_and(PrimitiveKind::is_numeric)
    }

    pub fn is_integral(&self) -> bool {
        self.primitive().is_some_and(PrimitiveKind::is_integral)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveKind::Any))
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether a value of type `self` may be stored where `target` is expected.
    ///
    /// `any` accepts every type; otherwise the types have to be structurally
    /// equal. There is no implicit numeric widening.
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        target.is_any() || self == target
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(kind) => f.write_str(kind.name()),
            Type::Struct(name) => f.write_str(name),
            Type::Array(inner) => write!(f, "[]{inner}"),
            Type::Pointer(base) => write!(f, "^{base}"),
        }
    }
}

/// Formats a list of types as `a, b, c` for diagnostics.
pub fn display_types(types: &[Type]) -> String {
    types
        .iter()
        .map(Type::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub variadic: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Parameter {
            name: name.into(),
            ty,
            variadic: false,
        }
    }

    pub fn variadic(name: impl Into<String>, ty: Type) -> Self {
        Parameter {
            name: name.into(),
            ty,
            variadic: true,
        }
    }
}

/// Name, parameters and return type shared by extern and local functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<Type>,
}

impl Signature {
    pub fn is_variadic(&self) -> bool {
        self.parameters.last().is_some_and(|p| p.variadic)
    }

    // parameters that always take exactly one argument
    pub fn fixed_parameters(&self) -> &[Parameter] {
        if self.is_variadic() {
            &self.parameters[..self.parameters.len() - 1]
        } else {
            &self.parameters
        }
    }

    pub fn variadic_parameter(&self) -> Option<&Parameter> {
        self.parameters.last().filter(|p| p.variadic)
    }

    /// Arity and per-argument compatibility check. Trailing arguments of a
    /// variadic signature are checked against the variadic element type.
    pub fn accepts(&self, argument_types: &[Type]) -> bool {
        let fixed = self.fixed_parameters();
        match self.variadic_parameter() {
            Some(variadic) => {
                argument_types.len() >= fixed.len()
                    && fixed
                        .iter()
                        .zip(argument_types)
                        .all(|(param, arg)| arg.is_assignable_to(&param.ty))
                    && argument_types[fixed.len()..]
                        .iter()
                        .all(|arg| arg.is_assignable_to(&variadic.ty))
            }
            None => {
                argument_types.len() == fixed.len()
                    && fixed
                        .iter()
                        .zip(argument_types)
                        .all(|(param, arg)| arg.is_assignable_to(&param.ty))
            }
        }
    }

    /// Two signatures collide when they share a name and the same ordered
    /// parameter types (variadic markers included).
    pub fn same_identity(&self, other: &Signature) -> bool {
        self.name == other.name
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| a.ty == b.ty && a.variadic == b.variadic)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if param.variadic {
                f.write_str("...")?;
            }
            write!(f, "{}", param.ty)?;
        }
        f.write_str(")")?;
        if let Some(return_type) = &self.return_type {
            write!(f, ": {return_type}")?;
        }
        Ok(())
    }
}
