//! GraphQL documents sent to the graph endpoint.

/// Fields of an exchange-form vertex.
const VERTEX_FIELDS: &str = r#"
    object_type
    internal_id
    identifier_stem
    id_value { data_type property_value }
    local_properties { property_name data_type property_value }
    sensitive_properties { property_name data_type pointer }
    stored_properties { property_name data_type storage_class storage_uri }
"#;

/// Stem-scoped listing, used when the candidate's stem is derived.
pub fn list_vertexes() -> String {
    format!(
        r#"query ListVertexes($object_type: String!, $identifier_stem: String!, $object_properties: [InputLocalProperty]!, $token: ID) {{
    list_vertexes(object_type: $object_type, identifier_stem: $identifier_stem, object_properties: $object_properties, token: $token) {{
        vertexes {{ {fields} }}
        token
    }}
}}"#,
        fields = VERTEX_FIELDS
    )
}

/// Property search across all stems of an object type.
pub fn find_vertexes() -> String {
    format!(
        r#"query FindVertexes($object_type: String!, $object_properties: [InputLocalProperty]!, $token: ID) {{
    find_vertexes(object_type: $object_type, object_properties: $object_properties, token: $token) {{
        vertexes {{ {fields} }}
        token
    }}
}}"#,
        fields = VERTEX_FIELDS
    )
}

pub const GRAPH_VERTEX: &str = r#"mutation GraphVertex($vertex: InputVertex!) {
    graph_vertex(vertex: $vertex) { ok }
}"#;

pub const GRAPH_CLUSTER: &str = r#"mutation GraphCluster($source_vertex: InputVertex!, $potential_vertex: InputVertex!, $edge: InputEdge!) {
    graph_cluster(source_vertex: $source_vertex, potential_vertex: $potential_vertex, edge: $edge) { ok }
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_name_their_operation() {
        assert!(list_vertexes().contains("list_vertexes("));
        assert!(list_vertexes().contains("storage_uri"));
        assert!(find_vertexes().contains("find_vertexes("));
        assert!(GRAPH_CLUSTER.contains("potential_vertex"));
    }
}
