use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

/// Role of a fenced block in a doctest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Code prepended to every later testcode block of the chapter
    Setup,
    /// Code to run
    Code,
    /// Output the preceding testcode block must print
    Output,
}

/// A fenced block carrying one of the doctest attributes.
///
/// Attributes follow the language in the fence info string, separated by
/// commas or spaces:
///
/// ````markdown
/// ```java,testcode
/// System.out.println(1 + 1);
/// ```
///
/// ```text,testoutput,+NORMALIZE_WHITESPACE
/// 2
/// ```
/// ````
///
/// `ignore` skips a block; `+FLAG` / `-FLAG` toggle comparison flags on a
/// testoutput block.
#[derive(Debug, Clone)]
pub struct ExampleBlock {
    pub language: String,
    pub kind: BlockKind,
    pub code: String,
    pub ignore: bool,
    pub flags: Vec<String>,
    /// 1-based line of the opening fence
    pub line: usize,
}

/// Expected output attached to an example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOutput {
    pub text: String,
    pub flags: Vec<String>,
}

/// A testcode block paired with its setup code and expected output.
#[derive(Debug, Clone)]
pub struct DocExample {
    pub language: String,
    /// Setup code followed by the testcode block
    pub code: String,
    pub expected: Option<ExpectedOutput>,
    pub line: usize,
}

/// Extracts the fenced blocks carrying a doctest attribute, in document order.
pub fn extract_example_blocks(content: &str) -> Vec<ExampleBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<ExampleBlock> = None;

    for (event, range) in Parser::new(content).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let (language, attributes) = parse_fence_info(&info);
                let kind = attributes.iter().find_map(|attr| match *attr {
                    "testsetup" => Some(BlockKind::Setup),
                    "testcode" => Some(BlockKind::Code),
                    "testoutput" => Some(BlockKind::Output),
                    _ => None,
                });

                current = kind.map(|kind| ExampleBlock {
                    language,
                    kind,
                    code: String::new(),
                    ignore: attributes.contains(&"ignore"),
                    flags: attributes
                        .iter()
                        .filter(|attr| attr.starts_with('+') || attr.starts_with('-'))
                        .map(|attr| attr.to_string())
                        .collect(),
                    line: content[..range.start].matches('\n').count() + 1,
                });
            }

            Event::Text(text) => {
                if let Some(block) = current.as_mut() {
                    block.code.push_str(&text);
                }
            }

            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
            }

            _ => {}
        }
    }

    blocks
}

/// Splits a fence info string into the language and its attributes.
/// - "java" -> ("java", [])
/// - "java,testcode" -> ("java", ["testcode"])
/// - "text testoutput +ELLIPSIS" -> ("text", ["testoutput", "+ELLIPSIS"])
fn parse_fence_info(info: &str) -> (String, Vec<&str>) {
    let mut parts = info
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty());

    let language = parts.next().unwrap_or_default().to_string();
    (language, parts.collect())
}

/// Pairs testcode and testoutput blocks and applies setup code.
///
/// Setup code accumulates in document order and is prepended to every
/// later testcode block of the same content; it never leaks across calls.
/// A testoutput block belongs to the testcode block right before it; an
/// orphan testoutput is reported and dropped.
pub fn extract_examples(content: &str) -> Vec<DocExample> {
    let mut examples = Vec::new();
    let mut setup = String::new();
    let mut pending: Option<DocExample> = None;

    for block in extract_example_blocks(content) {
        if block.ignore {
            continue;
        }

        match block.kind {
            BlockKind::Setup => {
                setup.push_str(&block.code);
                if !block.code.ends_with('\n') {
                    setup.push('\n');
                }
            }
            BlockKind::Code => {
                examples.extend(pending.take());
                pending = Some(DocExample {
                    language: block.language,
                    code: format!("{}{}", setup, block.code),
                    expected: None,
                    line: block.line,
                });
            }
            BlockKind::Output => match pending.take() {
                Some(mut example) => {
                    example.expected = Some(ExpectedOutput {
                        text: block.code,
                        flags: block.flags,
                    });
                    examples.push(example);
                }
                None => {
                    log::warn!(
                        "testoutput block at line {} has no preceding testcode block, skipping",
                        block.line
                    );
                }
            },
        }
    }

    examples.extend(pending);
    examples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_pairs_code_and_output() {
        let markdown = r#"
# Creating Objects

```java,testcode
import org.apache.arrow.memory.RootAllocator;

System.out.println("hi");
```

```text,testoutput
hi
```

Some prose.

```java
// not a doctest
```
"#;

        let examples = extract_examples(markdown);
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].language, "java");
        assert!(examples[0].code.starts_with("import org.apache.arrow"));
        assert_eq!(examples[0].line, 4);
        let expected = examples[0].expected.as_ref().unwrap();
        assert_eq!(expected.text, "hi\n");
        assert!(expected.flags.is_empty());
    }

    #[test]
    fn test_code_without_output_and_orphan_output() {
        let markdown = r#"
```text testoutput
orphan
```

```java testcode
a();
```

```java testcode
b();
```

```text testoutput +NORMALIZE_WHITESPACE -ELLIPSIS
b
```
"#;

        let examples = extract_examples(markdown);
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].code, "a();\n");
        assert!(examples[0].expected.is_none());
        assert_eq!(examples[1].code, "b();\n");
        assert_eq!(
            examples[1].expected.as_ref().unwrap().flags,
            vec!["+NORMALIZE_WHITESPACE", "-ELLIPSIS"]
        );
    }

    #[test]
    fn test_setup_is_prepended_to_later_code_only() {
        let markdown = r#"
```java,testcode
first();
```

```java,testsetup
import java.util.List;
```

```java,testcode
second();
```

```java,testcode,ignore
skipped();
```
"#;

        let examples = extract_examples(markdown);
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].code, "first();\n");
        assert_eq!(examples[1].code, "import java.util.List;\nsecond();\n");
    }

    #[test]
    fn test_parse_fence_info() {
        let (lang, attrs) = parse_fence_info("java");
        assert_eq!(lang, "java");
        assert!(attrs.is_empty());

        let (lang, attrs) = parse_fence_info("java, testcode");
        assert_eq!(lang, "java");
        assert_eq!(attrs, vec!["testcode"]);

        let (lang, attrs) = parse_fence_info("");
        assert_eq!(lang, "");
        assert!(attrs.is_empty());
    }
}
