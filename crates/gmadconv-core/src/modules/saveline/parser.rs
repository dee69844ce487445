use crate::domain::{LatticeError, ParserResult, PropertyValue};

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Statement {
    pub(super) source_line: usize,
    pub(super) text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Definition {
    Element {
        name: String,
        type_keyword: String,
        attributes: Vec<(String, PropertyValue)>,
        source_line: usize,
    },
    Line {
        name: String,
        items: Vec<LineItem>,
        source_line: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineItem {
    Reference {
        name: String,
        repeat: usize,
        reflect: bool,
    },
    Group {
        items: Vec<LineItem>,
        repeat: usize,
        reflect: bool,
    },
}

/// Joins `&` continuations, drops `!` comments and splits on `;`.
pub(super) fn collect_statements(source: &str) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut buffer = String::new();
    let mut buffer_start = 0_usize;

    for (index, raw_line) in source.lines().enumerate() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if buffer.is_empty() {
            buffer_start = index + 1;
        }

        if let Some(continued) = line.strip_suffix('&') {
            buffer.push_str(continued);
            buffer.push(' ');
            continue;
        }

        buffer.push_str(line);
        for piece in split_top_level(&buffer, ';') {
            let text = piece.trim();
            if !text.is_empty() {
                statements.push(Statement {
                    source_line: buffer_start,
                    text: text.to_string(),
                });
            }
        }
        buffer.clear();
    }

    let text = buffer.trim();
    if !text.is_empty() {
        statements.push(Statement {
            source_line: buffer_start,
            text: text.trim_end_matches(';').to_string(),
        });
    }

    statements
}

/// Returns `None` for unlabelled statements (`RETURN`, `USE`, parameter
/// assignments), which carry nothing for the beamline.
pub(super) fn parse_statement(statement: &Statement) -> ParserResult<Option<Definition>> {
    let Some((label, body)) = split_label(&statement.text) else {
        return Ok(None);
    };

    let name = label.trim().to_ascii_uppercase();
    if name.is_empty() || !is_identifier(&name) {
        return Err(syntax_error(
            statement.source_line,
            format!("invalid element label '{}'", label.trim()),
        ));
    }

    let body = body.trim();
    if let Some(line_body) = strip_line_keyword(body) {
        let items = parse_line_body(line_body, statement.source_line)?;
        return Ok(Some(Definition::Line {
            name,
            items,
            source_line: statement.source_line,
        }));
    }

    let mut parts = split_top_level(body, ',').into_iter();
    let type_keyword = parts
        .next()
        .map(|part| part.trim().to_ascii_uppercase())
        .filter(|keyword| !keyword.is_empty())
        .ok_or_else(|| {
            syntax_error(
                statement.source_line,
                format!("element '{}' has no type keyword", name),
            )
        })?;

    let mut attributes = Vec::new();
    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        attributes.push(parse_attribute(part, statement.source_line)?);
    }

    Ok(Some(Definition::Element {
        name,
        type_keyword,
        attributes,
        source_line: statement.source_line,
    }))
}

pub(super) fn parse_value(raw: &str) -> PropertyValue {
    let trimmed = raw.trim();
    if let Some(quoted) = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .or_else(|| {
            trimmed
                .strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''))
        })
    {
        return PropertyValue::Text(quoted.to_string());
    }

    match parse_number(trimmed) {
        Some(value) => PropertyValue::Number(value),
        None => PropertyValue::Text(trimmed.to_string()),
    }
}

fn parse_number(token: &str) -> Option<f64> {
    let normalized = token.replace(['D', 'd'], "E");
    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_attribute(part: &str, source_line: usize) -> ParserResult<(String, PropertyValue)> {
    let (key, value) = match part.split_once(":=").or_else(|| part.split_once('=')) {
        Some((key, value)) => (key.trim(), Some(value)),
        None => (part, None),
    };

    let key = key.to_ascii_uppercase();
    if !is_identifier(&key) {
        return Err(syntax_error(
            source_line,
            format!("invalid attribute name '{}'", key),
        ));
    }

    let value = match value {
        Some(raw) if raw.trim().is_empty() => {
            return Err(syntax_error(
                source_line,
                format!("attribute '{}' has no value", key),
            ));
        }
        Some(raw) => parse_value(raw),
        None => PropertyValue::Text("TRUE".to_string()),
    };

    Ok((key, value))
}

fn strip_line_keyword(body: &str) -> Option<&str> {
    let head = body.get(..4)?;
    if !head.eq_ignore_ascii_case("LINE") {
        return None;
    }
    let rest = body[4..].trim_start();
    let rest = rest.strip_prefix(":=").or_else(|| rest.strip_prefix('='))?;
    Some(rest.trim())
}

fn parse_line_body(body: &str, source_line: usize) -> ParserResult<Vec<LineItem>> {
    let mut cursor = LineCursor {
        chars: body.chars().collect(),
        position: 0,
        source_line,
    };

    cursor.skip_whitespace();
    cursor.expect('(')?;
    let items = cursor.parse_items()?;
    cursor.expect(')')?;
    cursor.skip_whitespace();
    if !cursor.at_end() {
        return Err(syntax_error(
            source_line,
            format!("unexpected trailing text in line definition: '{}'", cursor.rest()),
        ));
    }

    Ok(items)
}

struct LineCursor {
    chars: Vec<char>,
    position: usize,
    source_line: usize,
}

impl LineCursor {
    fn parse_items(&mut self) -> ParserResult<Vec<LineItem>> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                return Ok(items);
            }

            items.push(self.parse_item()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.position += 1,
                Some(')') => return Ok(items),
                Some(other) => {
                    return Err(syntax_error(
                        self.source_line,
                        format!("unexpected '{}' in line definition", other),
                    ));
                }
                None => {
                    return Err(syntax_error(
                        self.source_line,
                        "unterminated line definition",
                    ));
                }
            }
        }
    }

    fn parse_item(&mut self) -> ParserResult<LineItem> {
        self.skip_whitespace();
        let mut repeat = 1_usize;
        let digits = self.take_while(|character| character.is_ascii_digit());
        if !digits.is_empty() {
            repeat = digits.parse::<usize>().map_err(|_| {
                syntax_error(self.source_line, format!("invalid repeat count '{}'", digits))
            })?;
            self.skip_whitespace();
            self.expect('*')?;
            self.skip_whitespace();
        }

        let reflect = if self.peek() == Some('-') {
            self.position += 1;
            self.skip_whitespace();
            true
        } else {
            false
        };

        if self.peek() == Some('(') {
            self.position += 1;
            let items = self.parse_items()?;
            self.expect(')')?;
            return Ok(LineItem::Group {
                items,
                repeat,
                reflect,
            });
        }

        let name = self.take_while(|character| {
            character.is_ascii_alphanumeric() || matches!(character, '_' | '.' | '$')
        });
        if name.is_empty() {
            return Err(syntax_error(
                self.source_line,
                "expected an element name in line definition",
            ));
        }

        Ok(LineItem::Reference {
            name: name.to_ascii_uppercase(),
            repeat,
            reflect,
        })
    }

    fn expect(&mut self, expected: char) -> ParserResult<()> {
        if self.peek() == Some(expected) {
            self.position += 1;
            return Ok(());
        }
        Err(syntax_error(
            self.source_line,
            format!(
                "expected '{}' in line definition, found '{}'",
                expected,
                self.peek().map(String::from).unwrap_or_else(|| "end of statement".to_string())
            ),
        ))
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let start = self.position;
        while self.peek().is_some_and(&predicate) {
            self.position += 1;
        }
        self.chars[start..self.position].iter().collect()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn at_end(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn rest(&self) -> String {
        self.chars[self.position..].iter().collect()
    }
}

fn split_label(text: &str) -> Option<(&str, &str)> {
    let mut in_quotes = None;
    for (index, character) in text.char_indices() {
        match (character, in_quotes) {
            ('"' | '\'', None) => in_quotes = Some(character),
            (quote, Some(open)) if quote == open => in_quotes = None,
            (':', None) => {
                if text[index + 1..].starts_with('=') {
                    return None;
                }
                return Some((&text[..index], &text[index + 1..]));
            }
            ('=' | ',', None) => return None,
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0_i32;
    let mut in_quotes = None;
    let mut start = 0;

    for (index, character) in text.char_indices() {
        match (character, in_quotes) {
            ('"' | '\'', None) => in_quotes = Some(character),
            (quote, Some(open)) if quote == open => in_quotes = None,
            ('(' | '{', None) => depth += 1,
            (')' | '}', None) => depth -= 1,
            (candidate, None) if candidate == separator && depth == 0 => {
                pieces.push(&text[start..index]);
                start = index + character.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = None;
    for (index, character) in line.char_indices() {
        match (character, in_quotes) {
            ('"' | '\'', None) => in_quotes = Some(character),
            (quote, Some(open)) if quote == open => in_quotes = None,
            ('!', None) => return &line[..index],
            _ => {}
        }
    }
    line
}

fn is_identifier(token: &str) -> bool {
    let mut characters = token.chars();
    characters
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && characters.all(|character| {
            character.is_ascii_alphanumeric() || matches!(character, '_' | '.' | '$')
        })
}

fn syntax_error(source_line: usize, message: impl Into<String>) -> LatticeError {
    LatticeError::input_validation(
        "INPUT.SAVELINE_SYNTAX",
        format!("{} at line {}", message.into(), source_line),
    )
}
