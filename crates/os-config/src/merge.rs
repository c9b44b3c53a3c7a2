//! Merging of config bodies from several sources.
//!
//! Sources are applied in order. A later attribute replaces an earlier one
//! with the same name; blocks with the same identifier and labels are merged
//! recursively; any other block is appended.

use hcl::{Body, Structure};

pub fn merge_bodies(bodies: impl IntoIterator<Item = Body>) -> Body {
    let mut merged = Vec::new();
    for body in bodies {
        merge_into(&mut merged, body);
    }
    merged.into_iter().collect()
}

fn merge_into(target: &mut Vec<Structure>, body: Body) {
    for structure in body {
        match structure {
            Structure::Attribute(attr) => {
                let existing = target.iter_mut().find_map(|s| match s {
                    Structure::Attribute(a) if a.key == attr.key => Some(a),
                    _ => None,
                });
                match existing {
                    Some(existing) => *existing = attr,
                    None => target.push(Structure::Attribute(attr)),
                }
            }
            Structure::Block(block) => {
                let existing = target.iter_mut().find_map(|s| match s {
                    Structure::Block(b)
                        if b.identifier == block.identifier && b.labels == block.labels =>
                    {
                        Some(b)
                    }
                    _ => None,
                });
                match existing {
                    Some(existing) => {
                        let mut inner: Vec<Structure> =
                            std::mem::take(&mut existing.body).into_iter().collect();
                        merge_into(&mut inner, block.body);
                        existing.body = inner.into_iter().collect();
                    }
                    None => target.push(Structure::Block(block)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn merged_value(sources: &[&str]) -> Value {
        let bodies = sources.iter().map(|s| hcl::parse(s).unwrap());
        hcl::from_body(merge_bodies(bodies)).unwrap()
    }

    #[test]
    fn test_later_attribute_wins() {
        let value = merged_value(&["a = 1\nb = 1\n", "a = 2\n"]);
        assert_eq!(value["a"], json!(2));
        assert_eq!(value["b"], json!(1));
    }

    #[test]
    fn test_blocks_merge_recursively() {
        let value = merged_value(&[
            "ghost {\n  interval = 60\n  inner {\n    x = 1\n  }\n}\n",
            "ghost {\n  interval = 30\n  inner {\n    y = 2\n  }\n}\n",
        ]);
        assert_eq!(value["ghost"]["interval"], json!(30));
        assert_eq!(value["ghost"]["inner"]["x"], json!(1));
        assert_eq!(value["ghost"]["inner"]["y"], json!(2));
    }

    #[test]
    fn test_labelled_blocks_are_distinct() {
        let value = merged_value(&[
            "key \"a\" {\n  v = 1\n}\n",
            "key \"b\" {\n  v = 2\n}\nkey \"a\" {\n  w = 3\n}\n",
        ]);
        assert_eq!(value["key"]["a"]["v"], json!(1));
        assert_eq!(value["key"]["a"]["w"], json!(3));
        assert_eq!(value["key"]["b"]["v"], json!(2));
    }
}
