use serde_json::Value;

/// Root statement type
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
}

impl Statement {
    /// Entity the statement targets
    pub fn entity(&self) -> &str {
        match self {
            Statement::Select(stmt) => &stmt.from.entity,
            Statement::Update(stmt) => &stmt.from.entity,
            Statement::Delete(stmt) => &stmt.from.entity,
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(self, Statement::Select(_))
    }

    /// Named parameters in order of first appearance, without duplicates
    pub fn parameters(&self) -> Vec<String> {
        let mut names = Vec::new();
        let filter = match self {
            Statement::Select(stmt) => stmt.filter.as_ref(),
            Statement::Update(stmt) => {
                for assignment in &stmt.assignments {
                    assignment.value.collect_parameters(&mut names);
                }
                stmt.filter.as_ref()
            }
            Statement::Delete(stmt) => stmt.filter.as_ref(),
        };
        if let Some(condition) = filter {
            condition.collect_parameters(&mut names);
        }
        names
    }
}

/// `Entity alias` range variable
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRef {
    pub entity: String,
    pub alias: String,
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub projection: Projection,
    pub from: EntityRef,
    pub filter: Option<Condition>,
    pub order_by: Vec<OrderByExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `select b`
    Entity(String),
    /// `select b.title`
    Path(Path),
    /// `select count(b)`
    Count(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub path: Path,
    pub descending: bool,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub from: EntityRef,
    pub assignments: Vec<Assignment>,
    pub filter: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub path: Path,
    pub value: Operand,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub from: EntityRef,
    pub filter: Option<Condition>,
}

/// `alias.field.nested`; empty `fields` means the whole record
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub alias: String,
    pub fields: Vec<String>,
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.alias)?;
        for field in &self.fields {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(Path),
    Parameter(String),
    Literal(Value),
}

impl Operand {
    fn collect_parameters(&self, names: &mut Vec<String>) {
        if let Operand::Parameter(name) = self {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    /// `in :ids`, bound to an array (a scalar counts as a one-element list)
    Parameter(String),
    /// `in ('a', 'b')`
    Values(Vec<Operand>),
}

/// WHERE condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    In {
        operand: Operand,
        list: InList,
        negated: bool,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
    Like {
        operand: Operand,
        pattern: Operand,
        negated: bool,
    },
}

impl Condition {
    fn collect_parameters(&self, names: &mut Vec<String>) {
        match self {
            Condition::And(left, right) | Condition::Or(left, right) => {
                left.collect_parameters(names);
                right.collect_parameters(names);
            }
            Condition::Not(inner) => inner.collect_parameters(names),
            Condition::Compare { left, right, .. } => {
                left.collect_parameters(names);
                right.collect_parameters(names);
            }
            Condition::In { operand, list, .. } => {
                operand.collect_parameters(names);
                match list {
                    InList::Parameter(name) => {
                        if !names.contains(name) {
                            names.push(name.clone());
                        }
                    }
                    InList::Values(values) => {
                        for value in values {
                            value.collect_parameters(names);
                        }
                    }
                }
            }
            Condition::IsNull { operand, .. } => operand.collect_parameters(names),
            Condition::Like {
                operand, pattern, ..
            } => {
                operand.collect_parameters(names);
                pattern.collect_parameters(names);
            }
        }
    }
}
