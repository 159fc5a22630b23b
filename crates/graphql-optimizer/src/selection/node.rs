use async_graphql_parser::Pos;
use async_graphql_value::ConstValue;
use indexmap::IndexMap;

/// Shape of the value a field returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldShape {
    /// A single object or a plain list of objects
    #[default]
    Entity,
    /// A relay connection: `edges { node { .. } }`, `totalCount`, `pageInfo`
    Connection,
}

/// One field occurrence with fragments inlined and arguments resolved
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionNode {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: IndexMap<String, ConstValue>,
    pub children: Vec<SelectionNode>,
    pub pos: Pos,
}

impl SelectionNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: IndexMap::new(),
            children: Vec::new(),
            pos: Pos::default(),
        }
    }

    /// Key of the field in the response: the alias if present, otherwise the name
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: ConstValue) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn with_child(mut self, child: SelectionNode) -> Self {
        self.children.push(child);
        self
    }

    /// Add a leaf child for every name
    pub fn with_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children
            .extend(names.into_iter().map(|name| SelectionNode::new(name)));
        self
    }

    /// First child selecting `name`, regardless of alias
    pub fn child(&self, name: &str) -> Option<&SelectionNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
