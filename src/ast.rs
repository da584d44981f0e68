// File: src/ast.rs
//
// Polymorphic AST for Monkey source. Nodes are plain enums rather than a
// visitor hierarchy; the compiler lowers them with a single match per
// level. No node carries a source span; parse errors carry their own
// line/column straight from the token stream.

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let { name: String, value: Expression },
    Return { value: Expression },
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(String),
    IntegerLiteral(i64),
    Boolean(bool),
    StringLiteral(String),
    Prefix {
        operator: String,
        right: Box<Expression>,
    },
    Infix {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },
    FunctionLiteral {
        parameters: Vec<String>,
        body: BlockStatement,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    ArrayLiteral {
        elements: Vec<Expression>,
    },
    HashLiteral {
        pairs: Vec<(Expression, Expression)>,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
}

impl Expression {
    /// Deterministic textual form, used solely to sort hash-literal keys
    /// before compilation so repeated compiles emit identical bytecode.
    pub fn string_form(&self) -> String {
        match self {
            Expression::Identifier(name) => name.clone(),
            Expression::IntegerLiteral(v) => v.to_string(),
            Expression::Boolean(v) => v.to_string(),
            Expression::StringLiteral(s) => s.clone(),
            Expression::Prefix { operator, right } => {
                format!("({}{})", operator, right.string_form())
            }
            Expression::Infix { operator, left, right } => {
                format!("({} {} {})", left.string_form(), operator, right.string_form())
            }
            Expression::If { condition, .. } => format!("if{}", condition.string_form()),
            Expression::FunctionLiteral { parameters, .. } => {
                format!("fn({})", parameters.join(", "))
            }
            Expression::Call { function, arguments } => {
                let args: Vec<String> = arguments.iter().map(Expression::string_form).collect();
                format!("{}({})", function.string_form(), args.join(", "))
            }
            Expression::ArrayLiteral { elements } => {
                let els: Vec<String> = elements.iter().map(Expression::string_form).collect();
                format!("[{}]", els.join(", "))
            }
            Expression::HashLiteral { pairs } => {
                let ps: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k.string_form(), v.string_form()))
                    .collect();
                format!("{{{}}}", ps.join(", "))
            }
            Expression::Index { left, index } => {
                format!("({}[{}])", left.string_form(), index.string_form())
            }
        }
    }
}
