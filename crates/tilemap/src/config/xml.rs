use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};

use crate::tile::TileRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorCode {
    ReadFile,
    Write,
    XmlMalformed,
    InvalidRoot,
    MissingAttribute,
    InvalidValue,
    UnknownGroup,
    DuplicateGroup,
    DuplicateTile,
    InvalidTileRange,
    MissingSheetImage,
}

/// Load-time configuration failure. Always fatal for the descriptor being
/// loaded; nothing is partially applied.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub code: ConfigErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub(crate) fn new(code: ConfigErrorCode, message: String, file_path: &Path) -> Self {
        Self {
            code,
            message,
            file_path: file_path.to_path_buf(),
            location: None,
        }
    }
}

pub(crate) fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| {
        ConfigError::new(
            ConfigErrorCode::ReadFile,
            format!("failed to read XML file: {source}"),
            path,
        )
    })
}

pub(crate) fn parse_document<'input>(
    path: &Path,
    raw: &'input str,
) -> Result<Document<'input>, ConfigError> {
    Document::parse(raw).map_err(|error| ConfigError {
        code: ConfigErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })
}

/// Attribute and child access over a parsed descriptor, reporting failures
/// with the file path and the node position.
pub(crate) struct NodeReader<'a, 'input> {
    path: &'a Path,
    doc: &'a Document<'input>,
}

impl<'a, 'input> NodeReader<'a, 'input> {
    pub(crate) fn new(path: &'a Path, doc: &'a Document<'input>) -> Self {
        Self { path, doc }
    }

    /// Namespace prefixes (`lionengine:sheets`) are ignored, only local names are compared.
    pub(crate) fn expect_root(&self, name: &str) -> Result<Node<'a, 'input>, ConfigError> {
        let root = self.doc.root_element();
        if root.tag_name().name() != name {
            return Err(self.error_at(
                ConfigErrorCode::InvalidRoot,
                format!(
                    "root element must be <{name}>, found <{}>",
                    root.tag_name().name()
                ),
                root,
            ));
        }
        Ok(root)
    }

    pub(crate) fn children<'n>(
        &self,
        node: Node<'n, 'input>,
        name: &'n str,
    ) -> impl Iterator<Item = Node<'n, 'input>> + 'n {
        node.children()
            .filter(move |child| child.is_element() && child.tag_name().name() == name)
    }

    pub(crate) fn first_child<'n>(
        &self,
        node: Node<'n, 'input>,
        name: &str,
    ) -> Option<Node<'n, 'input>> {
        node.children()
            .find(|child| child.is_element() && child.tag_name().name() == name)
    }

    pub(crate) fn required_attr<'n>(
        &self,
        node: Node<'n, 'input>,
        name: &str,
    ) -> Result<&'n str, ConfigError> {
        node.attribute(name).ok_or_else(|| {
            self.error_at(
                ConfigErrorCode::MissingAttribute,
                format!(
                    "missing required attribute '{name}' on <{}>",
                    node.tag_name().name()
                ),
                node,
            )
        })
    }

    pub(crate) fn parse_attr<T: FromStr>(
        &self,
        node: Node<'_, 'input>,
        name: &str,
    ) -> Result<T, ConfigError> {
        let raw = self.required_attr(node, name)?;
        self.parse_value(node, name, raw)
    }

    pub(crate) fn parse_optional_attr<T: FromStr>(
        &self,
        node: Node<'_, 'input>,
        name: &str,
    ) -> Result<Option<T>, ConfigError> {
        match node.attribute(name) {
            Some(raw) => self.parse_value(node, name, raw).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn parse_bool_attr(
        &self,
        node: Node<'_, 'input>,
        name: &str,
    ) -> Result<bool, ConfigError> {
        let raw = self.required_attr(node, name)?;
        match raw.trim() {
            "true" | "TRUE" | "True" | "1" => Ok(true),
            "false" | "FALSE" | "False" | "0" => Ok(false),
            other => Err(self.error_at(
                ConfigErrorCode::InvalidValue,
                format!("attribute '{name}' value '{other}' is not a boolean"),
                node,
            )),
        }
    }

    pub(crate) fn required_text(
        &self,
        node: Node<'_, 'input>,
        field_name: &str,
    ) -> Result<String, ConfigError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                ConfigErrorCode::MissingAttribute,
                format!("element <{field_name}> must not be empty"),
                node,
            ));
        }
        Ok(value)
    }

    /// Reads a `<tile sheet=".." number=".."/>` reference.
    pub(crate) fn tile_ref(&self, node: Node<'_, 'input>) -> Result<TileRef, ConfigError> {
        Ok(TileRef::new(
            self.parse_attr(node, "sheet")?,
            self.parse_attr(node, "number")?,
        ))
    }

    pub(crate) fn error_at(
        &self,
        code: ConfigErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ConfigError {
        let pos = self.doc.text_pos_at(node.range().start);
        ConfigError {
            code,
            message,
            file_path: self.path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }

    fn parse_value<T: FromStr>(
        &self,
        node: Node<'_, 'input>,
        name: &str,
        raw: &str,
    ) -> Result<T, ConfigError> {
        raw.trim().parse::<T>().map_err(|_| {
            self.error_at(
                ConfigErrorCode::InvalidValue,
                format!("attribute '{name}' value '{raw}' is invalid"),
                node,
            )
        })
    }
}

/// Minimal element tree used when exporting descriptors.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn attr(mut self, name: &str, value: impl ToString) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub(crate) fn text(mut self, text: impl ToString) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub(crate) fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub(crate) fn tile(tile: TileRef) -> Self {
        Self::new("tile")
            .attr("sheet", tile.sheet)
            .attr("number", tile.number)
    }

    pub(crate) fn to_document(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write_into(&mut out, 0);
        out
    }

    fn write_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape(value));
            out.push('"');
        }
        match (&self.text, self.children.is_empty()) {
            (None, true) => out.push_str("/>\n"),
            (Some(text), true) => {
                out.push('>');
                out.push_str(&escape(text));
                out.push_str("</");
                out.push_str(&self.name);
                out.push_str(">\n");
            }
            (text, false) => {
                out.push_str(">\n");
                if let Some(text) = text {
                    out.push_str(&indent);
                    out.push_str("  ");
                    out.push_str(&escape(text));
                    out.push('\n');
                }
                for child in &self.children {
                    child.write_into(out, depth + 1);
                }
                out.push_str(&indent);
                out.push_str("</");
                out.push_str(&self.name);
                out.push_str(">\n");
            }
        }
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_root_matches_local_name() {
        let raw = r#"<lionengine:sheets xmlns:lionengine="http://lionengine.b3dgs.com"/>"#;
        let doc = parse_document(Path::new("sheets.xml"), raw).expect("parse");
        let reader = NodeReader::new(Path::new("sheets.xml"), &doc);
        assert!(reader.expect_root("sheets").is_ok());
    }

    #[test]
    fn wrong_root_reports_invalid_root_with_location() {
        let doc = parse_document(Path::new("a.xml"), "<groups/>").expect("parse");
        let reader = NodeReader::new(Path::new("a.xml"), &doc);
        let err = reader.expect_root("sheets").expect_err("err");
        assert_eq!(err.code, ConfigErrorCode::InvalidRoot);
        assert!(err.location.is_some());
    }

    #[test]
    fn malformed_xml_reports_location() {
        let err = parse_document(Path::new("a.xml"), "<groups><group></groups>").expect_err("err");
        assert_eq!(err.code, ConfigErrorCode::XmlMalformed);
        assert!(err.location.is_some());
    }

    #[test]
    fn invalid_number_attribute_is_invalid_value() {
        let raw = r#"<tile sheet="x" number="1"/>"#;
        let doc = parse_document(Path::new("a.xml"), raw).expect("parse");
        let reader = NodeReader::new(Path::new("a.xml"), &doc);
        let err = reader.tile_ref(doc.root_element()).expect_err("err");
        assert_eq!(err.code, ConfigErrorCode::InvalidValue);
    }

    #[test]
    fn written_document_parses_back() {
        let mut root = XmlElement::new("minimap");
        let mut color = XmlElement::new("color").attr("r", 1).attr("g", 2).attr("b", 3);
        color.push(XmlElement::tile(TileRef::new(0, 4)));
        root.push(color);
        root.push(XmlElement::new("note").text("a < b & \"c\""));
        let text = root.to_document();

        let doc = parse_document(Path::new("m.xml"), &text).expect("parse");
        let reader = NodeReader::new(Path::new("m.xml"), &doc);
        let root = reader.expect_root("minimap").expect("root");
        let color = reader.first_child(root, "color").expect("color");
        let tile = reader.first_child(color, "tile").expect("tile");
        assert_eq!(reader.tile_ref(tile).expect("tile ref"), TileRef::new(0, 4));
        let note = reader.first_child(root, "note").expect("note");
        assert_eq!(note.text(), Some("a < b & \"c\""));
    }
}
