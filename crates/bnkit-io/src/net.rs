//! Write-only export to the Hugin NET format.
//!
//! Node names are mangled into identifiers; state labels stay quoted strings. A
//! potential's `data` nests one parenthesis level per parent, first parent outermost,
//! with the node's own distribution innermost.

use bnkit_core::{Network, Variable};

use crate::mangle::IdentifierTable;

pub fn write_net(network: &Network) -> String {
    let mut names = IdentifierTable::new();
    let ids: Vec<String> = network
        .variables()
        .iter()
        .map(|v| names.identifier(v.name()))
        .collect();

    let mut out = String::from("net\n{\n}\n");
    for variable in network.variables() {
        let states: Vec<String> = variable.domain().iter().map(|l| quote(l)).collect();
        out.push_str(&format!(
            "node {}\n{{\n  label = {};\n  states = ({});\n}}\n",
            ids[variable.id().index()],
            quote(variable.name()),
            states.join(" ")
        ));
    }

    for variable in network.variables() {
        let head = &ids[variable.id().index()];
        if variable.parents().is_empty() {
            out.push_str(&format!("potential ( {} )\n{{\n", head));
        } else {
            let given: Vec<&str> = variable
                .parents()
                .iter()
                .map(|p| ids[p.index()].as_str())
                .collect();
            out.push_str(&format!("potential ( {} | {} )\n{{\n", head, given.join(" ")));
        }
        let cards: Vec<usize> = variable
            .parents()
            .iter()
            .map(|p| network.variable(*p).cardinality())
            .collect();
        let mut data = String::new();
        let mut row = vec![0usize; cards.len()];
        nest(variable, &cards, 0, &mut row, &mut data);
        out.push_str(&format!("  data = {};\n}}\n", data));
    }
    out
}

fn nest(variable: &Variable, cards: &[usize], depth: usize, row: &mut [usize], out: &mut String) {
    out.push('(');
    if depth == cards.len() {
        let offset = variable.row_offset(row);
        let values: Vec<String> = variable.cpt()[offset..offset + variable.cardinality()]
            .iter()
            .map(f64::to_string)
            .collect();
        out.push_str(&values.join(" "));
    } else {
        for value in 0..cards[depth] {
            row[depth] = value;
            nest(variable, cards, depth + 1, row, out);
        }
    }
    out.push(')');
}

fn quote(label: &str) -> String {
    format!("\"{}\"", label.replace('"', "'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_first_parent_outermost() {
        let mut net = Network::new("n");
        let a = net.add_variable("a", ["0", "1"]).unwrap();
        let b = net.add_variable("b", ["0", "1"]).unwrap();
        let c = net.add_variable("3c", ["x", "y"]).unwrap();
        net.add_parent(c, a).unwrap();
        net.add_parent(c, b).unwrap();
        net.set_cpt(a, vec![0.5, 0.5]).unwrap();
        net.set_cpt(b, vec![0.25, 0.75]).unwrap();
        // own value fastest, then a, then b
        net.set_cpt(c, vec![1.0, 0.0, 0.8, 0.2, 0.9, 0.1, 0.7, 0.3]).unwrap();

        let text = write_net(&net);
        assert!(text.starts_with("net\n{\n}\n"));
        assert!(text.contains("node n3c\n{\n  label = \"3c\";\n  states = (\"x\" \"y\");\n}"));
        assert!(text.contains("potential ( b )\n{\n  data = (0.25 0.75);"));
        assert!(text.contains("potential ( n3c | a b )"));
        assert!(text.contains("data = (((1 0)(0.9 0.1))((0.8 0.2)(0.7 0.3)));"));
    }
}
