//! Schema-XML cross-referencing.
//!
//! The engine reports schema structure in its own order and without measure
//! groups; both live in the catalog's schema XML. This module indexes the
//! XML (cube declaration order, measure groups, calculated-member group
//! annotations) and aligns an engine-returned [`Schema`] against it.
//! Alignment degrades, it never fails: a cube-count mismatch keeps the
//! engine order and logs a warning.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::warn;

use cubist_types::{MeasureGroup, Schema};

#[derive(Error, Debug)]
pub enum SchemaXmlError {
    #[error("malformed schema XML: {0}")]
    Malformed(#[from] quick_xml::Error),
}

/// Everything the service needs out of a schema XML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaXmlIndex {
    /// Cube names in document order.
    pub cube_order: Vec<String>,
    /// Measure groups per cube name.
    pub measure_groups: HashMap<String, Vec<MeasureGroup>>,
}

fn attribute(
    element: &quick_xml::events::BytesStart<'_>,
    name: &[u8],
) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

impl SchemaXmlIndex {
    pub fn parse(xml: &str) -> Result<Self, SchemaXmlError> {
        let mut reader = Reader::from_str(xml);

        let mut index = SchemaXmlIndex::default();
        let mut current_cube: Option<String> = None;
        let mut current_group: Option<MeasureGroup> = None;
        let mut calculated_member: Option<String> = None;
        let mut in_group_annotation = false;
        // (cube, calculated measure, group name) resolved after the pass.
        let mut group_annotations: Vec<(String, String, String)> = Vec::new();
        let mut annotation_text = String::new();

        loop {
            let event = reader.read_event()?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    // Self-closing elements have no children, so they never
                    // become the current container.
                    let opens_container = matches!(event, Event::Start(_));
                    let name = e.name().as_ref().to_vec();
                    match name.as_slice() {
                        b"Cube" => {
                            if let Some(cube_name) = attribute(e, b"name") {
                                index.cube_order.push(cube_name.clone());
                                if opens_container {
                                    current_cube = Some(cube_name);
                                }
                            }
                        }
                        b"MeasureGroup" if opens_container => {
                            if let Some(group_name) = attribute(e, b"name") {
                                current_group = Some(MeasureGroup {
                                    name: group_name,
                                    measure_references: Vec::new(),
                                    dimension_references: Vec::new(),
                                });
                            }
                        }
                        b"Measure" | b"MeasureRef" if current_group.is_some() => {
                            if let (Some(group), Some(measure)) =
                                (current_group.as_mut(), attribute(e, b"name"))
                            {
                                group.measure_references.push(measure);
                            }
                        }
                        b"CalculatedMember" if opens_container => {
                            calculated_member = attribute(e, b"name");
                        }
                        b"Annotation" if opens_container => {
                            if attribute(e, b"name").as_deref() == Some("MeasureGroup") {
                                in_group_annotation = true;
                                annotation_text.clear();
                            }
                        }
                        _ => {
                            // Any element inside a measure group that names a
                            // dimension links that dimension to the group.
                            if current_group.is_some() {
                                if let (Some(group), Some(dimension)) =
                                    (current_group.as_mut(), attribute(e, b"dimension"))
                                {
                                    group.dimension_references.push(dimension);
                                }
                            }
                        }
                    }
                }
                Event::Text(text) => {
                    if in_group_annotation {
                        annotation_text.push_str(&text.unescape()?);
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"Cube" => current_cube = None,
                    b"MeasureGroup" => {
                        if let (Some(cube), Some(group)) =
                            (current_cube.as_ref(), current_group.take())
                        {
                            index
                                .measure_groups
                                .entry(cube.clone())
                                .or_default()
                                .push(group);
                        }
                    }
                    b"CalculatedMember" => calculated_member = None,
                    b"Annotation" => {
                        if in_group_annotation {
                            in_group_annotation = false;
                            if let (Some(cube), Some(member)) =
                                (current_cube.as_ref(), calculated_member.as_ref())
                            {
                                group_annotations.push((
                                    cube.clone(),
                                    member.clone(),
                                    annotation_text.trim().to_string(),
                                ));
                            }
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        // Calculated measures attach to their annotated group after the
        // whole document is read, since the annotation may precede or
        // follow the group declaration.
        for (cube, member, group_name) in group_annotations {
            let groups = index.measure_groups.entry(cube.clone()).or_default();
            match groups.iter_mut().find(|g| g.name == group_name) {
                Some(group) => group.measure_references.push(member),
                None => warn!(
                    %cube,
                    group = %group_name,
                    %member,
                    "calculated member references unknown measure group"
                ),
            }
        }

        Ok(index)
    }
}

/// Attach measure groups and reorder cubes to XML declaration order. When
/// the engine and the XML disagree on the cube count, the engine order is
/// kept (logged, not raised).
pub fn align_schema(schema: &mut Schema, index: &SchemaXmlIndex) {
    for cube in &mut schema.cubes {
        if let Some(groups) = index.measure_groups.get(&cube.name) {
            cube.measure_groups = groups.clone();
        }
    }
    if schema.cubes.len() == index.cube_order.len() {
        schema.cubes.sort_by_key(|cube| {
            index
                .cube_order
                .iter()
                .position(|name| name == &cube.name)
                .map(|p| p as i64)
                .unwrap_or(-1)
        });
    } else {
        warn!(
            connection = %schema.connection_name,
            engine_cubes = schema.cubes.len(),
            xml_cubes = index.cube_order.len(),
            "cannot sort cubes, engine and schema XML disagree on cube count"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubist_types::Cube;

    const SCHEMA_XML: &str = r#"
        <Schema name="Demo">
          <Cube name="Second">
            <MeasureGroups>
              <MeasureGroup name="Core">
                <Measures>
                  <MeasureRef name="Units"/>
                  <Measure name="Revenue"/>
                </Measures>
                <DimensionLinks>
                  <ForeignKeyLink dimension="Date" foreignKeyColumn="date_id"/>
                  <FactLink dimension="Product"/>
                </DimensionLinks>
              </MeasureGroup>
            </MeasureGroups>
            <CalculatedMember name="Margin" dimension="Measures">
              <Annotations>
                <Annotation name="MeasureGroup">Core</Annotation>
              </Annotations>
            </CalculatedMember>
          </Cube>
          <Cube name="First"/>
        </Schema>
    "#;

    fn cube(name: &str) -> Cube {
        Cube {
            name: name.to_string(),
            caption: name.to_string(),
            measures: vec![],
            dimensions: vec![],
            measure_groups: vec![],
        }
    }

    #[test]
    fn cube_order_follows_document_order() {
        let index = SchemaXmlIndex::parse(SCHEMA_XML).unwrap();
        assert_eq!(index.cube_order, vec!["Second", "First"]);
    }

    #[test]
    fn measure_groups_collect_measures_and_dimension_links() {
        let index = SchemaXmlIndex::parse(SCHEMA_XML).unwrap();
        let groups = index.measure_groups.get("Second").unwrap();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.name, "Core");
        assert_eq!(
            group.measure_references,
            vec!["Units", "Revenue", "Margin"]
        );
        assert_eq!(group.dimension_references, vec!["Date", "Product"]);
    }

    #[test]
    fn annotation_for_unknown_group_is_skipped() {
        let xml = r#"
            <Schema name="S">
              <Cube name="C">
                <CalculatedMember name="Orphan">
                  <Annotations><Annotation name="MeasureGroup">Nope</Annotation></Annotations>
                </CalculatedMember>
              </Cube>
            </Schema>
        "#;
        let index = SchemaXmlIndex::parse(xml).unwrap();
        assert!(index
            .measure_groups
            .get("C")
            .map(|g| g.is_empty())
            .unwrap_or(true));
    }

    #[test]
    fn align_reorders_cubes_when_counts_match() {
        let index = SchemaXmlIndex::parse(SCHEMA_XML).unwrap();
        let mut schema = Schema {
            name: "Demo".to_string(),
            connection_name: "demo".to_string(),
            cubes: vec![cube("First"), cube("Second")],
        };
        align_schema(&mut schema, &index);
        assert_eq!(schema.cubes[0].name, "Second");
        assert_eq!(schema.cubes[1].name, "First");
        assert_eq!(schema.cubes[0].measure_groups.len(), 1);
    }

    #[test]
    fn align_keeps_engine_order_on_count_mismatch() {
        let index = SchemaXmlIndex::parse(SCHEMA_XML).unwrap();
        let mut schema = Schema {
            name: "Demo".to_string(),
            connection_name: "demo".to_string(),
            cubes: vec![cube("First")],
        };
        align_schema(&mut schema, &index);
        assert_eq!(schema.cubes[0].name, "First");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(SchemaXmlIndex::parse("<Schema><Cube").is_err());
    }
}
