//! Builder for tools described by a function signature and its docstring.

use super::definition::{ParameterSpec, ToolDefinition};
use super::docstring;
use super::schema::TypeSchema;
use super::{SchemaError, Tool, ToolCallInstance, ToolHandler};
use crate::utils::text::{is_identifier, pascal_case};
use crate::Result;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

const RECEIVERS: [&str; 2] = ["self", "cls"];

#[derive(Debug, Clone)]
struct DeclaredParam {
    name: String,
    schema: Option<TypeSchema>,
    default: Option<Value>,
}

/// Declares a function tool parameter by parameter.
///
/// ```
/// use ai_call::tools::Tool;
///
/// let tool = Tool::function("format_book")
///     .docstring(
///         "Returns a formatted book title.
///
///         Args:
///             title: The title of the book.
///             author: The author of the book.
///         ",
///     )
///     .param::<String>("title")
///     .param::<String>("author")
///     .build()
///     .unwrap();
/// assert_eq!(tool.name(), "FormatBook");
/// ```
pub struct FunctionToolBuilder {
    function_name: String,
    docstring: Option<String>,
    params: Vec<DeclaredParam>,
    handler: Option<ToolHandler>,
    pending_error: Option<SchemaError>,
}

impl FunctionToolBuilder {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            docstring: None,
            params: Vec::new(),
            handler: None,
            pending_error: None,
        }
    }

    pub fn docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    /// Implicit receiver (`self`/`cls`); never part of the schema.
    pub fn receiver(mut self, name: impl Into<String>) -> Self {
        self.params.push(DeclaredParam {
            name: name.into(),
            schema: None,
            default: None,
        });
        self
    }

    pub fn param<T: JsonSchema>(mut self, name: impl Into<String>) -> Self {
        self.params.push(DeclaredParam {
            name: name.into(),
            schema: Some(TypeSchema::of::<T>()),
            default: None,
        });
        self
    }

    pub fn param_with_default<T: JsonSchema + Serialize>(
        mut self,
        name: impl Into<String>,
        default: T,
    ) -> Self {
        let name = name.into();
        let default = match serde_json::to_value(&default) {
            Ok(v) => Some(v),
            Err(e) => {
                self.pending_error.get_or_insert(SchemaError::InvalidSchema {
                    tool: pascal_case(&self.function_name),
                    reason: format!("default for `{}` is not serializable: {}", name, e),
                });
                None
            }
        };
        self.params.push(DeclaredParam {
            name,
            schema: Some(TypeSchema::of::<T>()),
            default,
        });
        self
    }

    /// A parameter declared without a type; `build` rejects it.
    pub fn untyped_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(DeclaredParam {
            name: name.into(),
            schema: None,
            default: None,
        });
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ToolCallInstance) -> Result<Value> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> std::result::Result<Tool, SchemaError> {
        let tool_name = pascal_case(&self.function_name);
        if let Some(err) = self.pending_error {
            return Err(err);
        }

        let doc = self
            .docstring
            .as_deref()
            .map(docstring::parse)
            .filter(|d| d.short_description.is_some())
            .ok_or_else(|| SchemaError::MissingDocstring {
                tool: tool_name.clone(),
            })?;

        if !is_identifier(&tool_name) {
            return Err(SchemaError::InvalidName { name: tool_name });
        }

        let mut parameters = Vec::new();
        let mut defs = Map::new();
        let declared = self
            .params
            .into_iter()
            .filter(|p| !RECEIVERS.contains(&p.name.as_str()));

        for (i, param) in declared.enumerate() {
            let ts = param.schema.ok_or_else(|| SchemaError::UntypedParameter {
                tool: tool_name.clone(),
                param: param.name.clone(),
            })?;

            let mut spec = ParameterSpec::new(param.name.clone(), ts.schema);
            if let Some(documented) = doc.params.get(i) {
                if documented.name != param.name {
                    return Err(SchemaError::ParameterMismatch {
                        tool: tool_name,
                        param: param.name,
                        documented: documented.name.clone(),
                    });
                }
                if documented.description.is_empty() {
                    return Err(SchemaError::MissingParameterDescription {
                        tool: tool_name,
                        param: param.name,
                    });
                }
                spec = spec.with_description(documented.description.clone());
            }
            if let Some(default) = param.default {
                spec = spec.with_default(default);
            }

            defs.extend(ts.defs);
            parameters.push(spec);
        }

        let definition = ToolDefinition {
            name: tool_name,
            description: doc.description().unwrap_or_default(),
            parameters,
            defs,
        };
        let tool = Tool::new(definition);
        Ok(match self.handler {
            Some(handler) => tool.with_shared_handler(handler),
            None => tool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tool::ToolCall;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    const FORMAT_BOOK_DOC: &str = "Returns a formatted book recommendation.

        Args:
            title: The title of the book.
            author: The author of the book.
            pages: Number of pages.
        ";

    #[test]
    fn test_parameter_order_matches_declaration() {
        let tool = Tool::function("format_book")
            .docstring(FORMAT_BOOK_DOC)
            .receiver("self")
            .param::<String>("title")
            .param::<String>("author")
            .param_with_default::<u32>("pages", 100)
            .build()
            .unwrap();

        let def = tool.definition();
        assert_eq!(def.name, "FormatBook");
        assert_eq!(def.description, "Returns a formatted book recommendation.");
        assert_eq!(def.parameter_names(), vec!["title", "author", "pages"]);

        let schema = def.parameters_schema();
        assert_eq!(schema["required"], json!(["title", "author"]));
        assert_eq!(schema["properties"]["pages"]["default"], 100);
        assert_eq!(
            schema["properties"]["author"]["description"],
            "The author of the book."
        );
    }

    #[test]
    fn test_missing_docstring_fails() {
        let err = Tool::function("format_book")
            .param::<String>("title")
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingDocstring { .. }));
    }

    #[test]
    fn test_untyped_parameter_fails() {
        let err = Tool::function("format_book")
            .docstring(FORMAT_BOOK_DOC)
            .param::<String>("title")
            .untyped_param("author")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UntypedParameter {
                tool: "FormatBook".into(),
                param: "author".into()
            }
        );
    }

    #[test]
    fn test_documented_order_must_match() {
        let err = Tool::function("format_book")
            .docstring(FORMAT_BOOK_DOC)
            .param::<String>("author")
            .param::<String>("title")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::ParameterMismatch { ref param, ref documented, .. }
                if param == "author" && documented == "title"
        ));
    }

    #[test]
    fn test_documented_parameter_needs_description() {
        let err = Tool::function("count")
            .docstring("Counts things.\n\nArgs:\n    n:\n")
            .param::<i64>("n")
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingParameterDescription { .. }));
    }

    #[test]
    fn test_undocumented_parameters_are_allowed() {
        let tool = Tool::function("ping")
            .docstring("Pings a host.")
            .param::<String>("host")
            .build()
            .unwrap();
        let schema = tool.definition().parameters_schema();
        assert!(schema["properties"]["host"].get("description").is_none());
    }

    #[test]
    fn test_invalid_name_fails() {
        let err = Tool::function("1st-tool")
            .docstring("Does a thing.")
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidName { .. }));
    }

    #[test]
    fn test_reserved_prefix_round_trip() {
        let tool = Tool::function("lookup")
            .docstring("Looks something up.\n\nArgs:\n    tool_name: Name of the thing.\n")
            .param::<String>("tool_name")
            .build()
            .unwrap();

        let schema = tool.definition().parameters_schema();
        assert!(schema["properties"].get("tool_name").is_some());

        let call = ToolCall::new("call_1", "Lookup", r#"{"tool_name": "hammer"}"#);
        let instance = tool.from_tool_call(&call).unwrap();
        assert_eq!(instance.args().get("aliased_tool_name"), Some(&json!("hammer")));
        assert_eq!(instance.get("tool_name"), Some(&json!("hammer")));
        assert_eq!(instance.arguments().get("tool_name"), Some(&json!("hammer")));
    }

    #[test]
    fn test_tool_call_parameter_round_trip() {
        let tool = Tool::function("lookup")
            .docstring("Looks something up.\n\nArgs:\n    tool_call: The call.\n")
            .param::<String>("tool_call")
            .build()
            .unwrap();

        let schema = tool.definition().parameters_schema();
        assert_eq!(schema["properties"]["tool_call"]["type"], "string");
        assert_eq!(schema["required"], json!(["tool_call"]));

        let call = ToolCall::new("call_2", "Lookup", r#"{"tool_call": "ring"}"#);
        let instance = tool.from_tool_call(&call).unwrap();
        assert_eq!(instance.args().get("aliased_tool_call"), Some(&json!("ring")));
        assert_eq!(instance.get("tool_call"), Some(&json!("ring")));
        assert_eq!(instance.tool_call().id, "call_2");

        let missing = ToolCall::new("call_3", "Lookup", "{}");
        assert!(tool.from_tool_call(&missing).is_err());
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Author {
        first_name: String,
        last_name: String,
    }

    #[test]
    fn test_struct_parameter_lands_in_defs() {
        let tool = Tool::function("format_book")
            .docstring("Formats a book.")
            .param::<String>("title")
            .param::<Author>("author")
            .build()
            .unwrap();
        let schema = tool.definition().parameters_schema();
        assert_eq!(schema["properties"]["author"]["$ref"], "#/$defs/Author");
        assert!(schema["$defs"]["Author"]["properties"]["first_name"].is_object());

        let call = ToolCall::new(
            "call_1",
            "FormatBook",
            r#"{"title": "Dune", "author": {"first_name": "Frank", "last_name": "Herbert"}}"#,
        );
        let instance = tool.from_tool_call(&call).unwrap();
        let author: Author = serde_json::from_value(instance.get("author").unwrap().clone()).unwrap();
        assert_eq!(author.last_name, "Herbert");
    }

    #[test]
    fn test_handler_is_invoked() {
        let tool = Tool::function("format_book")
            .docstring("Formats a book.")
            .param::<String>("title")
            .handler(|call| {
                let title = call.get("title").and_then(|v| v.as_str()).unwrap_or_default();
                Ok(json!(format!("<<{}>>", title)))
            })
            .build()
            .unwrap();
        let call = ToolCall::new("id", "FormatBook", r#"{"title": "Dune"}"#);
        let instance = tool.from_tool_call(&call).unwrap();
        assert_eq!(instance.call().unwrap(), json!("<<Dune>>"));
    }
}
