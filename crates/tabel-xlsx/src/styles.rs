//! `xl/styles.xml` editing.
//!
//! All edits are find-or-create and splice only the affected section
//! (`<fills>`, `<fonts>`, `<cellXfs>`), leaving the rest of the part
//! byte-identical. Find-or-create is what makes repeated highlighting a
//! fixpoint: the second run finds the fill/xf the first run created.

use std::collections::BTreeMap;

use roxmltree::{Document, Node};

use crate::package::XlsxError;

const DEFAULT_STYLESHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>
  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>
"#;

pub struct StylesEditor {
    xml: String,
}

impl StylesEditor {
    /// Open the stylesheet, falling back to a minimal default when the
    /// package carries no `xl/styles.xml`.
    pub fn from_part(bytes: Option<&[u8]>) -> Result<Self, XlsxError> {
        let xml = match bytes {
            Some(bytes) => std::str::from_utf8(bytes)
                .map_err(|_| XlsxError::Invalid("styles.xml is not utf-8".to_string()))?
                .to_string(),
            None => DEFAULT_STYLESHEET.to_string(),
        };
        // Validate up front so later edits can assume a parseable document.
        Document::parse(&xml)?;
        Ok(Self { xml })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.xml.into_bytes()
    }

    /// Index of a solid fill with the given foreground color, creating it if
    /// absent.
    pub fn ensure_solid_fill(&mut self, argb: &str) -> Result<u32, XlsxError> {
        if let Some(idx) = self.find_solid_fill(argb)? {
            return Ok(idx);
        }
        let fill = format!(
            r#"<fill><patternFill patternType="solid"><fgColor rgb="{argb}"/><bgColor indexed="64"/></patternFill></fill>"#
        );
        self.append_to_section("fills", &fill)
    }

    /// Index of a bold font with the given color, creating it if absent.
    pub fn ensure_bold_font(&mut self, argb: &str) -> Result<u32, XlsxError> {
        if let Some(idx) = self.with_section("fonts", |fonts| {
            Ok(element_children(fonts).position(|font| {
                let bold = font.children().any(|c| c.has_tag_name("b"));
                let color = font
                    .children()
                    .find(|c| c.has_tag_name("color"))
                    .and_then(|c| c.attribute("rgb"));
                bold && color == Some(argb)
            }))
        })? {
            return Ok(idx as u32);
        }
        let font = format!(r#"<font><b/><color rgb="{argb}"/></font>"#);
        self.append_to_section("fonts", &font)
    }

    /// Index of a cell XF identical to `base_xf` except that it carries the
    /// given fill, creating it if absent. Deriving from an already-derived XF
    /// resolves to itself.
    pub fn xf_with_fill(&mut self, base_xf: u32, fill_id: u32) -> Result<u32, XlsxError> {
        let (mut attrs, order, inner) = self.read_xf(base_xf)?;
        attrs.insert("fillId".to_string(), fill_id.to_string());
        attrs.insert("applyFill".to_string(), "1".to_string());
        self.find_or_append_xf(&attrs, &order, &inner)
    }

    /// Index of a cell XF that applies the given font on otherwise default
    /// formatting, creating it if absent.
    pub fn xf_with_font(&mut self, font_id: u32) -> Result<u32, XlsxError> {
        let mut attrs = BTreeMap::new();
        for (key, value) in [
            ("numFmtId", "0".to_string()),
            ("fontId", font_id.to_string()),
            ("fillId", "0".to_string()),
            ("borderId", "0".to_string()),
            ("xfId", "0".to_string()),
            ("applyFont", "1".to_string()),
        ] {
            attrs.insert(key.to_string(), value);
        }
        let order: Vec<String> = ["numFmtId", "fontId", "fillId", "borderId", "xfId", "applyFont"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.find_or_append_xf(&attrs, &order, "")
    }

    /// Fill index referenced by a cell XF (inspection helper).
    pub fn xf_fill_id(&self, xf: u32) -> Result<Option<u32>, XlsxError> {
        self.with_section("cellXfs", |xfs| {
            Ok(element_children(xfs)
                .nth(xf as usize)
                .and_then(|n| n.attribute("fillId"))
                .and_then(|v| v.parse().ok()))
        })
    }

    /// Font index referenced by a cell XF (inspection helper).
    pub fn xf_font_id(&self, xf: u32) -> Result<Option<u32>, XlsxError> {
        self.with_section("cellXfs", |xfs| {
            Ok(element_children(xfs)
                .nth(xf as usize)
                .and_then(|n| n.attribute("fontId"))
                .and_then(|v| v.parse().ok()))
        })
    }

    /// All fill indexes that are solid fills of the given color.
    pub fn solid_fill_ids(&self, argb: &str) -> Result<Vec<u32>, XlsxError> {
        self.with_section("fills", |fills| {
            Ok(element_children(fills)
                .enumerate()
                .filter(|(_, fill)| is_solid_fill(*fill, argb))
                .map(|(idx, _)| idx as u32)
                .collect())
        })
    }

    fn find_solid_fill(&self, argb: &str) -> Result<Option<u32>, XlsxError> {
        Ok(self.solid_fill_ids(argb)?.first().copied())
    }

    fn with_section<T>(
        &self,
        section: &str,
        f: impl FnOnce(Node<'_, '_>) -> Result<T, XlsxError>,
    ) -> Result<T, XlsxError> {
        let doc = Document::parse(&self.xml)?;
        let node = doc
            .root_element()
            .children()
            .find(|n| n.has_tag_name(section))
            .ok_or_else(|| XlsxError::Invalid(format!("styles.xml has no <{section}>")))?;
        f(node)
    }

    /// Rebuild `<section>` with one more child, preserving existing children
    /// byte-for-byte (copied from their source ranges).
    fn append_to_section(&mut self, section: &str, child_xml: &str) -> Result<u32, XlsxError> {
        let (range, children) = {
            let doc = Document::parse(&self.xml)?;
            let node = doc
                .root_element()
                .children()
                .find(|n| n.has_tag_name(section))
                .ok_or_else(|| XlsxError::Invalid(format!("styles.xml has no <{section}>")))?;
            let children: Vec<String> = element_children(node)
                .map(|c| self.xml[c.range()].to_string())
                .collect();
            (node.range(), children)
        };
        let index = children.len() as u32;
        let mut rebuilt = format!(r#"<{section} count="{}">"#, children.len() + 1);
        for child in &children {
            rebuilt.push_str(child);
        }
        rebuilt.push_str(child_xml);
        rebuilt.push_str(&format!("</{section}>"));
        self.xml.replace_range(range, &rebuilt);
        Ok(index)
    }

    /// Attributes (unescaped), source attribute order, and inner XML of a
    /// cell XF.
    fn read_xf(&self, index: u32) -> Result<(BTreeMap<String, String>, Vec<String>, String), XlsxError> {
        let doc = Document::parse(&self.xml)?;
        let xfs = doc
            .root_element()
            .children()
            .find(|n| n.has_tag_name("cellXfs"))
            .ok_or_else(|| XlsxError::Invalid("styles.xml has no <cellXfs>".to_string()))?;
        let xf = element_children(xfs)
            .nth(index as usize)
            .ok_or_else(|| XlsxError::Invalid(format!("cell style index {index} out of range")))?;
        let mut attrs = BTreeMap::new();
        let mut order = Vec::new();
        for attr in xf.attributes() {
            attrs.insert(attr.name().to_string(), attr.value().to_string());
            order.push(attr.name().to_string());
        }
        let inner: String = element_children(xf)
            .map(|c| self.xml[c.range()].to_string())
            .collect();
        Ok((attrs, order, inner))
    }

    fn find_or_append_xf(
        &mut self,
        attrs: &BTreeMap<String, String>,
        order: &[String],
        inner: &str,
    ) -> Result<u32, XlsxError> {
        let target_inner = normalize_ws(inner);
        if let Some(idx) = self.with_section("cellXfs", |xfs| {
            Ok(element_children(xfs).position(|xf| {
                let mut existing = BTreeMap::new();
                for attr in xf.attributes() {
                    existing.insert(attr.name().to_string(), attr.value().to_string());
                }
                if existing != *attrs {
                    return false;
                }
                let existing_inner: String = element_children(xf)
                    .map(|c| self.xml[c.range()].to_string())
                    .collect();
                normalize_ws(&existing_inner) == target_inner
            }))
        })? {
            return Ok(idx as u32);
        }

        // Serialize with the base XF's attribute order, new attributes last.
        let mut xf = String::from("<xf");
        let mut written: Vec<&str> = Vec::new();
        for key in order {
            if let Some(value) = attrs.get(key) {
                if written.contains(&key.as_str()) {
                    continue;
                }
                xf.push_str(&format!(r#" {key}="{}""#, escape_attr(value)));
                written.push(key);
            }
        }
        for (key, value) in attrs {
            if !written.iter().any(|k| k == key) {
                xf.push_str(&format!(r#" {key}="{}""#, escape_attr(value)));
            }
        }
        if inner.is_empty() {
            xf.push_str("/>");
        } else {
            xf.push('>');
            xf.push_str(inner);
            xf.push_str("</xf>");
        }
        self.append_to_section("cellXfs", &xf)
    }
}

fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn is_solid_fill(fill: Node<'_, '_>, argb: &str) -> bool {
    fill.children()
        .find(|c| c.has_tag_name("patternFill"))
        .map(|pf| {
            pf.attribute("patternType") == Some("solid")
                && pf
                    .children()
                    .find(|c| c.has_tag_name("fgColor"))
                    .and_then(|c| c.attribute("rgb"))
                    == Some(argb)
        })
        .unwrap_or(false)
}

// Alignment/protection children carry no whitespace-significant content, so
// equality checks can ignore formatting whitespace entirely.
fn normalize_ws(xml: &str) -> String {
    xml.chars().filter(|c| !c.is_whitespace()).collect()
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
