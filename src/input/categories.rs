// src/input/categories.rs
//! The category list: one category per line of a markdown file.

use crate::constants::DEFAULT_REQUIRED_BRANDS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpec {
    pub name: String,
    /// Distinct brands the category should end up with
    pub required_brands: usize,
}

/// Parses the list, keeping the window of `count` categories starting at
/// index `start`.
///
/// Lines are lowercased; blank lines and `#` headers are skipped and do not
/// count towards the window. A trailing `: <n>` sets the required brand
/// count.
pub fn parse_categories(text: &str, start: usize, count: Option<usize>) -> Vec<CategorySpec> {
    text.lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let line = line.trim_start_matches(['-', '*']).trim().to_string();
            parse_line(&line)
        })
        .skip(start)
        .take(count.unwrap_or(usize::MAX))
        .collect()
}

fn parse_line(line: &str) -> CategorySpec {
    if let Some((name, n)) = line.rsplit_once(':') {
        if let Ok(required_brands) = n.trim().parse::<usize>() {
            return CategorySpec {
                name: name.trim().to_string(),
                required_brands,
            };
        }
    }
    CategorySpec {
        name: line.to_string(),
        required_brands: DEFAULT_REQUIRED_BRANDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LIST: &str = "# Electronics\n\nWireless Headphones\n- Laptops: 12\n\n## Home\nCoffee Makers\nAir: Purifiers\n";

    fn spec(name: &str, required_brands: usize) -> CategorySpec {
        CategorySpec {
            name: name.to_string(),
            required_brands,
        }
    }

    #[test]
    fn parses_names_and_counts() {
        assert_eq!(
            parse_categories(LIST, 0, None),
            vec![
                spec("wireless headphones", 20),
                spec("laptops", 12),
                spec("coffee makers", 20),
                spec("air: purifiers", 20),
            ]
        );
    }

    #[test]
    fn window_skips_headers_when_counting() {
        let names: Vec<String> = parse_categories(LIST, 1, Some(2))
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["laptops", "coffee makers"]);
    }
}
