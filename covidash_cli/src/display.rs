use comfy_table::{presets::NOTHING, *};
use covidash::catalog::{Catalog, Country, SelectOption};

fn styled_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .into_iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        )
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

pub fn countries_table(countries: &[Country]) -> Table {
    let mut table = styled_table(vec!["Country ID", "Location", "ISO 3166-1 alpha-3"]);
    for country in countries {
        table.add_row(vec![
            country.id.to_string(),
            country.location.clone(),
            country.iso_code.clone(),
        ]);
    }
    table
}

pub fn display_countries(countries: &[Country]) {
    if countries.is_empty() {
        println!("No countries could be loaded.");
        return;
    }
    println!("\n{}", countries_table(countries));
}

fn options_table(options: &[SelectOption<String>]) -> Table {
    let mut table = styled_table(vec!["Metric", "Label"]);
    for option in options {
        table.add_row(vec![option.value.clone(), option.label.clone()]);
    }
    table
}

pub fn display_metrics(catalog: &Catalog) {
    for (heading, options) in [
        ("Time-series metrics", catalog.time_series_options()),
        ("Correlation metrics", catalog.correlation_options()),
        ("Country attributes", catalog.attribute_options()),
    ] {
        println!("\n{heading}:");
        if options.is_empty() {
            println!("  (none available)");
        } else {
            println!("{}", options_table(&options));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countries_table_lists_every_country() {
        let countries = vec![
            Country {
                id: 38,
                iso_code: "CAN".into(),
                location: "Canada".into(),
            },
            Country {
                id: 71,
                iso_code: "FRA".into(),
                location: "France".into(),
            },
        ];
        let rendered = countries_table(&countries).to_string();
        assert!(rendered.contains("Canada"));
        assert!(rendered.contains("FRA"));
    }
}
