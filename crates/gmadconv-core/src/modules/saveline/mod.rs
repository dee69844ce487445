//! MAD8 saveline reader.
//!
//! A saveline is a flat dump of element definitions followed by `LINE`
//! definitions that reference them. Parsing keeps both tables; expansion
//! into an ordered [`Beamline`] happens on request so a file can be
//! inspected for several lines.

mod parser;

pub use parser::LineItem;

use crate::domain::{
    Beamline, ElementKind, ElementRecord, LatticeError, LatticeResult, ParserResult,
};
use parser::{Definition, collect_statements, parse_statement};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct LineDefinition {
    pub name: String,
    pub items: Vec<LineItem>,
    pub source_line: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Saveline {
    elements: BTreeMap<String, ElementRecord>,
    element_order: Vec<String>,
    lines: BTreeMap<String, LineDefinition>,
    line_order: Vec<String>,
}

impl Saveline {
    pub fn element(&self, name: &str) -> Option<&ElementRecord> {
        self.elements.get(&name.to_ascii_uppercase())
    }

    pub fn element_names(&self) -> &[String] {
        &self.element_order
    }

    pub fn line(&self, name: &str) -> Option<&LineDefinition> {
        self.lines.get(&name.to_ascii_uppercase())
    }

    pub fn line_names(&self) -> &[String] {
        &self.line_order
    }

    /// Expands `line_name`, or the last line in the file when `None`.
    pub fn beamline(&self, line_name: Option<&str>) -> ParserResult<Beamline> {
        let root = match line_name {
            Some(name) => self.line(name).ok_or_else(|| {
                LatticeError::input_validation(
                    "INPUT.SAVELINE_UNDEFINED",
                    format!("line '{}' is not defined in the saveline", name),
                )
            })?,
            None => self
                .line_order
                .last()
                .and_then(|name| self.lines.get(name))
                .ok_or_else(|| {
                    LatticeError::input_validation(
                        "INPUT.SAVELINE_NO_LINE",
                        "saveline does not define any LINE to expand",
                    )
                })?,
        };

        let mut beamline = Beamline::new(root.name.clone());
        let mut stack = vec![root.name.clone()];
        self.expand_items(&root.items, root.source_line, &mut stack, &mut beamline.elements)?;
        Ok(beamline)
    }

    fn expand_items(
        &self,
        items: &[LineItem],
        source_line: usize,
        stack: &mut Vec<String>,
        out: &mut Vec<ElementRecord>,
    ) -> ParserResult<()> {
        for item in items {
            match item {
                LineItem::Reference {
                    name,
                    repeat,
                    reflect,
                } => {
                    let mut expanded = Vec::new();
                    self.expand_reference(name, source_line, stack, &mut expanded)?;
                    if *reflect {
                        expanded.reverse();
                    }
                    for _ in 0..*repeat {
                        out.extend(expanded.iter().cloned());
                    }
                }
                LineItem::Group {
                    items,
                    repeat,
                    reflect,
                } => {
                    let mut expanded = Vec::new();
                    self.expand_items(items, source_line, stack, &mut expanded)?;
                    if *reflect {
                        expanded.reverse();
                    }
                    for _ in 0..*repeat {
                        out.extend(expanded.iter().cloned());
                    }
                }
            }
        }
        Ok(())
    }

    fn expand_reference(
        &self,
        name: &str,
        source_line: usize,
        stack: &mut Vec<String>,
        out: &mut Vec<ElementRecord>,
    ) -> ParserResult<()> {
        if let Some(line) = self.lines.get(name) {
            if stack.iter().any(|open| open == name) {
                return Err(LatticeError::input_validation(
                    "INPUT.SAVELINE_CYCLE",
                    format!(
                        "line '{}' references itself through {}",
                        name,
                        stack.join(" -> ")
                    ),
                ));
            }
            stack.push(name.to_string());
            self.expand_items(&line.items, line.source_line, stack, out)?;
            stack.pop();
            return Ok(());
        }

        let element = self.elements.get(name).ok_or_else(|| {
            LatticeError::input_validation(
                "INPUT.SAVELINE_UNDEFINED",
                format!(
                    "line element '{}' referenced at line {} is not defined",
                    name, source_line
                ),
            )
        })?;
        out.push(element.clone());
        Ok(())
    }

    fn insert_element(&mut self, element: ElementRecord) {
        if self.elements.insert(element.name.clone(), element.clone()).is_some() {
            tracing::debug!(element = %element.name, "saveline redefines element; later definition wins");
        } else {
            self.element_order.push(element.name);
        }
    }

    fn insert_line(&mut self, line: LineDefinition) {
        let name = line.name.clone();
        if self.lines.insert(name.clone(), line).is_some() {
            tracing::debug!(line = %name, "saveline redefines line; later definition wins");
            self.line_order.retain(|existing| existing != &name);
        }
        self.line_order.push(name);
    }
}

pub fn parse_saveline(source: &str) -> ParserResult<Saveline> {
    let mut saveline = Saveline::default();

    for statement in collect_statements(source) {
        let Some(definition) = parse_statement(&statement)? else {
            tracing::trace!(line = statement.source_line, "skipping unlabelled saveline statement");
            continue;
        };

        match definition {
            Definition::Line {
                name,
                items,
                source_line,
            } => saveline.insert_line(LineDefinition {
                name,
                items,
                source_line,
            }),
            Definition::Element {
                name,
                type_keyword,
                attributes,
                source_line,
            } => {
                let mut element = resolve_element_class(&saveline, &name, &type_keyword);
                element.source_line = source_line;
                for (key, value) in attributes {
                    element.set(&key, value);
                }
                saveline.insert_element(element);
            }
        }
    }

    Ok(saveline)
}

pub fn load_saveline(path: impl AsRef<Path>) -> LatticeResult<Saveline> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| {
        LatticeError::io_system(
            "IO.SAVELINE_READ",
            format!("failed to read saveline '{}': {}", path.display(), source),
        )
    })?;
    parse_saveline(&source)
}

/// A type keyword naming an earlier element makes the new element a copy of
/// that element's class, with its own attributes layered on top.
fn resolve_element_class(saveline: &Saveline, name: &str, type_keyword: &str) -> ElementRecord {
    let kind = ElementKind::from_keyword(type_keyword);
    if kind.is_builtin() {
        return ElementRecord::new(name, kind);
    }

    match saveline.elements.get(type_keyword) {
        Some(parent) => {
            let mut element = parent.clone();
            element.name = name.to_string();
            element
        }
        None => ElementRecord::new(name, kind),
    }
}
