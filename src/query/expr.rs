use super::select::SelectQuery;
use crate::types::RowValues;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    And,
    Or,
    Add,
    Sub,
}

impl BinaryOp {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Like => "LIKE",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
        }
    }
}

/// A SQL expression tree. Values are always sent as bound parameters.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Column reference; `table.column` is quoted part by part.
    Column(String),
    Value(RowValues),
    /// Verbatim SQL fragment.
    Sql(String),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Not(Box<Expr>),
    IsNull { expr: Box<Expr>, negated: bool },
    InList { expr: Box<Expr>, values: Vec<Expr>, negated: bool },
    InQuery { expr: Box<Expr>, query: Box<SelectQuery>, negated: bool },
    Func { name: String, args: Vec<Expr> },
    Alias(Box<Expr>, String),
}

/// Reference a column.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// A bound parameter.
pub fn val(value: impl Into<RowValues>) -> Expr {
    Expr::Value(value.into())
}

/// A verbatim SQL fragment, e.g. `sql("COUNT(1)")`.
pub fn sql(fragment: impl Into<String>) -> Expr {
    Expr::Sql(fragment.into())
}

pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Func {
        name: name.into(),
        args,
    }
}

impl Expr {
    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(Box::new(self), op, Box::new(rhs.into()))
    }

    #[must_use]
    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Eq, rhs)
    }

    #[must_use]
    pub fn ne(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ne, rhs)
    }

    #[must_use]
    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lt, rhs)
    }

    #[must_use]
    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Le, rhs)
    }

    #[must_use]
    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gt, rhs)
    }

    #[must_use]
    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ge, rhs)
    }

    #[must_use]
    pub fn like(self, pattern: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Like, pattern)
    }

    #[must_use]
    pub fn and(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::And, rhs)
    }

    #[must_use]
    pub fn or(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Or, rhs)
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Sub, rhs)
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    #[must_use]
    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    #[must_use]
    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    #[must_use]
    pub fn in_list<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Expr>,
    {
        Expr::InList {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    #[must_use]
    pub fn not_in_list<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Expr>,
    {
        Expr::InList {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    #[must_use]
    pub fn in_query(self, query: SelectQuery) -> Expr {
        Expr::InQuery {
            expr: Box::new(self),
            query: Box::new(query),
            negated: false,
        }
    }

    #[must_use]
    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias(Box::new(self), name.into())
    }

    #[must_use]
    pub fn asc(self) -> Ordering {
        Ordering {
            expr: self,
            descending: false,
        }
    }

    #[must_use]
    pub fn desc(self) -> Ordering {
        Ordering {
            expr: self,
            descending: true,
        }
    }
}

macro_rules! value_expr {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Value(value.into())
                }
            }
        )*
    };
}

value_expr!(
    RowValues,
    i64,
    i32,
    f64,
    bool,
    &str,
    String,
    chrono::NaiveDateTime,
    serde_json::Value,
    Vec<u8>,
);

/// One `ORDER BY` term.
#[derive(Debug, Clone)]
pub struct Ordering {
    pub expr: Expr,
    pub descending: bool,
}

impl From<Expr> for Ordering {
    fn from(expr: Expr) -> Self {
        expr.asc()
    }
}
