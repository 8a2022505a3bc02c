//! XML interchange in the XMLBIF 0.3 dialect.
//!
//! ```xml
//! <BIF VERSION="0.3">
//! <NETWORK>
//! <NAME>census</NAME>
//! <VARIABLE TYPE="nature"><NAME>age</NAME><OUTCOME>&lt;15</OUTCOME>...</VARIABLE>
//! <DEFINITION><FOR>age</FOR><GIVEN>gender</GIVEN><TABLE>0.55 0.45 0.5 0.5</TABLE></DEFINITION>
//! </NETWORK>
//! </BIF>
//! ```
//!
//! `TABLE` lists probabilities with the first `GIVEN` parent varying slowest and the
//! variable's own value fastest. Values are written in shortest round-trip form, so a
//! written network reads back identical. Element names match case-insensitively and
//! `PROBABILITY` is accepted as an alias of `DEFINITION`.

use std::path::Path;

use bnkit_core::{BnError, DomainIterator, Network, VarId};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use rustc_hash::FxHashSet;

use crate::errors::{IoError, IoResult};

#[derive(Debug, Default)]
struct VariableDecl {
    name: Option<String>,
    outcomes: Vec<String>,
}

#[derive(Debug, Default)]
struct Definition {
    child: Option<String>,
    given: Vec<String>,
    table: Vec<f64>,
}

/// Parses an XMLBIF document into a validated network.
pub fn read_xml(source: &str) -> IoResult<Network> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut network_name: Option<String> = None;
    let mut variables: Vec<VariableDecl> = Vec::new();
    let mut definitions: Vec<Definition> = Vec::new();
    let mut variable: Option<VariableDecl> = None;
    let mut definition: Option<Definition> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_ascii_uppercase();
                match name.as_str() {
                    "VARIABLE" => variable = Some(VariableDecl::default()),
                    "DEFINITION" | "PROBABILITY" => definition = Some(Definition::default()),
                    _ => {}
                }
                path.push(name);
                text.clear();
            }
            Event::Text(chunk) => text.push_str(&chunk.unescape()?),
            Event::CData(chunk) => text.push_str(&String::from_utf8_lossy(&chunk)),
            Event::End(_) => {
                let Some(name) = path.pop() else {
                    return Err(IoError::parse("document", "unbalanced closing tag"));
                };
                let parent = path.last().map(String::as_str);
                let value = std::mem::take(&mut text);
                match (name.as_str(), parent) {
                    ("NAME", Some("NETWORK")) => network_name = Some(value),
                    ("NAME", Some("VARIABLE")) => {
                        if let Some(decl) = variable.as_mut() {
                            decl.name = Some(value);
                        }
                    }
                    ("OUTCOME" | "VALUE", Some("VARIABLE")) => {
                        if let Some(decl) = variable.as_mut() {
                            decl.outcomes.push(value);
                        }
                    }
                    ("FOR", _) => {
                        if let Some(def) = definition.as_mut() {
                            def.child = Some(value);
                        }
                    }
                    ("GIVEN", _) => {
                        if let Some(def) = definition.as_mut() {
                            def.given.push(value);
                        }
                    }
                    ("TABLE", _) => {
                        if let Some(def) = definition.as_mut() {
                            def.table.extend(parse_table(&value)?);
                        }
                    }
                    ("VARIABLE", _) => variables.extend(variable.take()),
                    ("DEFINITION" | "PROBABILITY", _) => definitions.extend(definition.take()),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !path.is_empty() {
        return Err(IoError::parse(&path.join("/"), "unexpected end of document"));
    }
    build(network_name, variables, definitions)
}

pub fn read_xml_file(path: impl AsRef<Path>) -> IoResult<Network> {
    let source = std::fs::read_to_string(path)?;
    read_xml(&source)
}

fn parse_table(text: &str) -> IoResult<Vec<f64>> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| IoError::parse("TABLE", format!("'{}' is not a number", token)))
        })
        .collect()
}

fn build(name: Option<String>, variables: Vec<VariableDecl>, definitions: Vec<Definition>) -> IoResult<Network> {
    let mut network = Network::new(name.unwrap_or_default());
    for decl in variables {
        let Some(name) = decl.name else {
            return Err(IoError::parse("VARIABLE", "missing NAME"));
        };
        network.add_variable(&name, &decl.outcomes)?;
    }

    let mut defined: FxHashSet<VarId> = FxHashSet::default();
    for def in definitions {
        let Some(child) = def.child else {
            return Err(IoError::parse("DEFINITION", "missing FOR"));
        };
        let child = network.variable_id(&child)?;
        if !defined.insert(child) {
            return Err(IoError::parse(
                "DEFINITION",
                format!("'{}' is defined twice", network.variable(child).name()),
            ));
        }
        for parent in &def.given {
            let parent = network.variable_id(parent)?;
            network.add_parent(child, parent)?;
        }
        let offsets = interchange_offsets(&network, child);
        if def.table.len() != offsets.len() {
            return Err(BnError::MalformedCpt {
                variable: network.variable(child).name().to_string(),
                reason: format!("expected {} values, got {}", offsets.len(), def.table.len()),
            }
            .into());
        }
        let mut cpt = vec![0.0; offsets.len()];
        for (offset, value) in offsets.into_iter().zip(def.table) {
            cpt[offset] = value;
        }
        network.set_cpt(child, cpt)?;
    }

    if let Some(missing) = network.ids().find(|var| !defined.contains(var)) {
        return Err(BnError::MalformedCpt {
            variable: network.variable(missing).name().to_string(),
            reason: "no probability definition".into(),
        }
        .into());
    }
    network.validate()?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "read network '{}' with {} variables",
        network.name(),
        network.len()
    );
    Ok(network)
}

/// CPT offsets in interchange order: first parent slowest, own value fastest.
pub(crate) fn interchange_offsets(network: &Network, var: VarId) -> Vec<usize> {
    let variable = network.variable(var);
    let card = variable.cardinality();
    let mut offsets = Vec::with_capacity(variable.cpt().len());
    for parents in DomainIterator::new(network, variable.parents()) {
        let base = variable.row_offset(&parents);
        offsets.extend((0..card).map(|value| base + value));
    }
    offsets
}

/// Serializes `network` as an XMLBIF document.
pub fn write_xml(network: &Network) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<BIF VERSION=\"0.3\">\n<NETWORK>\n");
    out.push_str(&format!("<NAME>{}</NAME>\n", escape(network.name())));

    for variable in network.variables() {
        out.push_str("<VARIABLE TYPE=\"nature\">\n");
        out.push_str(&format!("\t<NAME>{}</NAME>\n", escape(variable.name())));
        for label in variable.domain() {
            out.push_str(&format!("\t<OUTCOME>{}</OUTCOME>\n", escape(label.as_ref())));
        }
        out.push_str("</VARIABLE>\n");
    }

    for variable in network.variables() {
        out.push_str("<DEFINITION>\n");
        out.push_str(&format!("\t<FOR>{}</FOR>\n", escape(variable.name())));
        for parent in variable.parents() {
            out.push_str(&format!(
                "\t<GIVEN>{}</GIVEN>\n",
                escape(network.variable(*parent).name())
            ));
        }
        let table: Vec<String> = interchange_offsets(network, variable.id())
            .into_iter()
            .map(|offset| variable.cpt()[offset].to_string())
            .collect();
        out.push_str(&format!("\t<TABLE>{}</TABLE>\n", table.join(" ")));
        out.push_str("</DEFINITION>\n");
    }

    out.push_str("</NETWORK>\n</BIF>\n");
    out
}

pub fn write_xml_file(network: &Network, path: impl AsRef<Path>) -> IoResult<()> {
    std::fs::write(path, write_xml(network))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENSUS: &str = r#"<?xml version="1.0"?>
<BIF VERSION="0.3">
<NETWORK>
<NAME>census</NAME>
<!-- two variables -->
<VARIABLE TYPE="nature">
    <NAME>gender</NAME>
    <OUTCOME>male</OUTCOME>
    <OUTCOME>female</OUTCOME>
    <PROPERTY>position = (0, 0)</PROPERTY>
</VARIABLE>
<VARIABLE TYPE="nature">
    <NAME>age</NAME>
    <OUTCOME>&lt;15</OUTCOME>
    <OUTCOME>&gt;=15</OUTCOME>
</VARIABLE>
<DEFINITION>
    <FOR>gender</FOR>
    <TABLE>0.55 0.45</TABLE>
</DEFINITION>
<DEFINITION>
    <FOR>age</FOR>
    <GIVEN>gender</GIVEN>
    <TABLE>0.55 0.45
           0.5 0.5</TABLE>
</DEFINITION>
</NETWORK>
</BIF>
"#;

    #[test]
    fn reads_census() {
        let net = read_xml(CENSUS).unwrap();
        assert_eq!(net.name(), "census");
        let age = net.variable_id("age").unwrap();
        assert_eq!(net.variable(age).domain()[0].as_ref(), "<15");
        assert_eq!(net.probability(age, ">=15", &["female"]).unwrap(), 0.5);
        assert_eq!(net.probability(age, "<15", &["male"]).unwrap(), 0.55);
    }

    #[test]
    fn table_order_puts_the_first_parent_slowest() {
        let doc = r#"<BIF><NETWORK>
<VARIABLE><NAME>a</NAME><OUTCOME>0</OUTCOME><OUTCOME>1</OUTCOME></VARIABLE>
<VARIABLE><NAME>b</NAME><OUTCOME>0</OUTCOME><OUTCOME>1</OUTCOME></VARIABLE>
<VARIABLE><NAME>c</NAME><OUTCOME>0</OUTCOME><OUTCOME>1</OUTCOME></VARIABLE>
<DEFINITION><FOR>a</FOR><TABLE>0.5 0.5</TABLE></DEFINITION>
<DEFINITION><FOR>b</FOR><TABLE>0.5 0.5</TABLE></DEFINITION>
<DEFINITION><FOR>c</FOR><GIVEN>a</GIVEN><GIVEN>b</GIVEN>
<TABLE>1 0 0.9 0.1 0.8 0.2 0.7 0.3</TABLE></DEFINITION>
</NETWORK></BIF>"#;
        let net = read_xml(doc).unwrap();
        let c = net.variable_id("c").unwrap();
        assert_eq!(net.probability(c, "1", &["0", "1"]).unwrap(), 0.1);
        assert_eq!(net.probability(c, "1", &["1", "0"]).unwrap(), 0.2);
        assert_eq!(net.probability(c, "0", &["1", "1"]).unwrap(), 0.7);
    }

    #[test]
    fn round_trip_is_lossless() {
        let net = read_xml(CENSUS).unwrap();
        let mut tweaked = net.clone();
        let gender = tweaked.variable_id("gender").unwrap();
        tweaked.set_cpt(gender, vec![1.0 / 3.0, 2.0 / 3.0]).unwrap();
        let again = read_xml(&write_xml(&tweaked)).unwrap();
        assert_eq!(again.name(), tweaked.name());
        for (a, b) in tweaked.variables().iter().zip(again.variables()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.domain(), b.domain());
            assert_eq!(a.parents(), b.parents());
            assert_eq!(a.cpt(), b.cpt());
        }
    }

    #[test]
    fn rejects_malformed_tables() {
        let short = CENSUS.replace("<TABLE>0.55 0.45</TABLE>", "<TABLE>0.55</TABLE>");
        assert!(matches!(
            read_xml(&short),
            Err(IoError::Network(BnError::MalformedCpt { .. }))
        ));
        let unnormalized = CENSUS.replace("<TABLE>0.55 0.45</TABLE>", "<TABLE>0.5 0.45</TABLE>");
        assert!(matches!(
            read_xml(&unnormalized),
            Err(IoError::Network(BnError::MalformedCpt { .. }))
        ));
        let garbage = CENSUS.replace("<TABLE>0.55 0.45</TABLE>", "<TABLE>0.55 x</TABLE>");
        assert!(matches!(read_xml(&garbage), Err(IoError::Parse { .. })));
    }

    #[test]
    fn rejects_missing_definitions_and_unknown_names() {
        let twice = CENSUS.replace("<FOR>gender</FOR>", "<FOR>age</FOR>");
        assert!(matches!(read_xml(&twice), Err(IoError::Parse { .. })));
        let start = CENSUS.find("<DEFINITION>").unwrap();
        let end = CENSUS.find("</DEFINITION>").unwrap() + "</DEFINITION>".len();
        let missing = format!("{}{}", &CENSUS[..start], &CENSUS[end..]);
        assert!(matches!(
            read_xml(&missing),
            Err(IoError::Network(BnError::MalformedCpt { .. }))
        ));
        let unknown = CENSUS.replace("<GIVEN>gender</GIVEN>", "<GIVEN>sex</GIVEN>");
        assert!(matches!(
            read_xml(&unknown),
            Err(IoError::Network(BnError::UnknownVariable(_)))
        ));
        let truncated = &CENSUS[..CENSUS.len() - 20];
        assert!(read_xml(truncated).is_err());
    }
}
