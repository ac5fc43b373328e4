/// Declare a serializable AST node struct with a `span` field.
#[macro_export]
macro_rules! declare_ast_node {
    {
        $(#[$attr:meta])*
        $vis:vis struct $name:ident {
            $($(#[$fattr:meta])* $field_vis:vis $field:ident: $ty:ty,)*
        }
    } => {
        $(#[$attr])*
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        #[derive(Debug, Clone, PartialEq)]
        $vis struct $name {
            $($(#[$fattr])* $field_vis $field: $ty),*
        }

        impl $name {
            pub fn span(&self) -> &cwasm_span::Span {
                &self.span
            }
        }
    }
}

/// Declare a serializable AST enum whose variants each wrap a node with a span.
#[macro_export]
macro_rules! declare_ast_variant {
    {
        $(#[$attr:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident($ty:ty),)*
        }
    } => {
        $(#[$attr])*
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $name {
            $($variant($ty),)*
        }

        impl $name {
            pub fn span(&self) -> &cwasm_span::Span {
                match self {
                    $($name::$variant(node) => node.span(),)*
                }
            }
        }
    }
}
