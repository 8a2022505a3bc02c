//! Write-only export to the BIF text format.
//!
//! Names and labels are mangled into identifiers; parent rows are listed in
//! interchange order with the first parent varying slowest.

use bnkit_core::{DomainIterator, Network};

use crate::mangle::IdentifierTable;

pub fn write_bif(network: &Network) -> String {
    let mut names = IdentifierTable::new();
    let network_name = names.identifier(network.name());
    let ids: Vec<String> = network
        .variables()
        .iter()
        .map(|v| names.identifier(v.name()))
        .collect();
    let labels: Vec<Vec<String>> = network
        .variables()
        .iter()
        .map(|v| {
            let mut table = IdentifierTable::new();
            v.domain().iter().map(|label| table.identifier(label)).collect()
        })
        .collect();

    let mut out = format!("network {} {{\n}}\n", network_name);
    for variable in network.variables() {
        let index = variable.id().index();
        out.push_str(&format!(
            "variable {} {{\n  type discrete [ {} ] {{ {} }};\n}}\n",
            ids[index],
            variable.cardinality(),
            labels[index].join(", ")
        ));
    }

    for variable in network.variables() {
        let index = variable.id().index();
        let card = variable.cardinality();
        if variable.parents().is_empty() {
            out.push_str(&format!(
                "probability ( {} ) {{\n  table {};\n}}\n",
                ids[index],
                join_row(&variable.cpt()[..card])
            ));
            continue;
        }
        let given: Vec<&str> = variable
            .parents()
            .iter()
            .map(|p| ids[p.index()].as_str())
            .collect();
        out.push_str(&format!(
            "probability ( {} | {} ) {{\n",
            ids[index],
            given.join(", ")
        ));
        for row in DomainIterator::new(network, variable.parents()) {
            let key: Vec<&str> = variable
                .parents()
                .iter()
                .zip(row.iter())
                .map(|(p, value)| labels[p.index()][*value].as_str())
                .collect();
            let offset = variable.row_offset(&row);
            out.push_str(&format!(
                "  ({}) {};\n",
                key.join(", "),
                join_row(&variable.cpt()[offset..offset + card])
            ));
        }
        out.push_str("}\n");
    }
    out
}

fn join_row(values: &[f64]) -> String {
    values
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_mangled_census() {
        let mut net = Network::new("census 2011");
        let gender = net.add_variable("gender", ["male", "female"]).unwrap();
        let age = net.add_variable("age group", ["<15", ">=15"]).unwrap();
        net.add_parent(age, gender).unwrap();
        net.set_cpt(gender, vec![0.55, 0.45]).unwrap();
        net.set_cpt(age, vec![0.55, 0.45, 0.5, 0.5]).unwrap();

        let bif = write_bif(&net);
        assert!(bif.starts_with("network census_2011 {"));
        assert!(bif.contains("variable age_group {\n  type discrete [ 2 ] { _15, _15_2 };"));
        assert!(bif.contains("probability ( gender ) {\n  table 0.55, 0.45;"));
        assert!(bif.contains("probability ( age_group | gender ) {"));
        assert!(bif.contains("  (male) 0.55, 0.45;\n  (female) 0.5, 0.5;"));
    }
}
