pub mod parser;
pub mod writer;

use std::collections::{HashMap, HashSet};

pub use parser::StepParser;
pub use writer::write_step_file;

/// A single entity instance parsed out of a STEP `DATA;` section.
///
/// See the data model for the field meanings: `payload` is the raw
/// argument list (parentheses balanced, quoted strings preserved
/// byte-for-byte), `source` is the full original record text (used
/// verbatim by the emitter, reference tokens and all), and `out_refs` is
/// the set of ids the payload references, self excluded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    id: u64,
    type_name: String,
    payload: String,
    source: String,
    out_refs: Vec<u64>,
}

impl Entity {
    /// Builds an entity, deriving `out_refs` from the payload.
    pub(crate) fn new(id: u64, type_name: String, payload: String, source: String) -> Entity {
        let mut out_refs = Vec::new();
        let mut seen = HashSet::new();
        for_each_reference(&payload, |r| {
            if r != id && seen.insert(r) {
                out_refs.push(r);
            }
        });

        Entity {
            id,
            type_name,
            payload,
            source,
            out_refs,
        }
    }

    /// The id of this entity, unique within its graph.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The upper-case type name. For complex records this is the first
    /// identifier found in the argument list.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The raw argument payload, parentheses balanced.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The full original record text, e.g. `#12=CARTESIAN_POINT('',(0.,0.,0.));`.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The ids this entity references, self excluded.
    pub fn out_refs(&self) -> &[u64] {
        &self.out_refs
    }

    /// The first single-quoted string literal in the payload, if any.
    pub fn first_quoted_string(&self) -> Option<&str> {
        first_quoted_string(&self.payload)
    }
}

/// A parsed STEP entity graph: the id -> entity mapping, plus the
/// derived relations used by the resolver, collector and hasher.
#[derive(Debug, Default)]
pub struct Graph {
    entities: Vec<Entity>,
    index: HashMap<u64, usize>,
    by_type: HashMap<String, Vec<u64>>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Inserts an entity, keeping insertion order for `by_type`.
    pub(crate) fn insert(&mut self, entity: Entity) {
        self.by_type
            .entry(entity.type_name.clone())
            .or_default()
            .push(entity.id);

        match self.index.get(&entity.id) {
            Some(&pos) => self.entities[pos] = entity,
            None => {
                self.index.insert(entity.id, self.entities.len());
                self.entities.push(entity);
            }
        }
    }

    /// The number of entities in the graph.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the graph has no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Looks up an entity by id.
    pub fn lookup(&self, id: u64) -> Option<&Entity> {
        self.index.get(&id).map(|&pos| &self.entities[pos])
    }

    /// Returns the ids of all entities of the given type, in the order
    /// they were parsed.
    pub fn by_type(&self, type_name: &str) -> &[u64] {
        self.by_type
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All entities, in parse order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The transitive closure of `out_refs` starting at `id`, restricted
    /// to ids present in the graph. `id` itself is included when present.
    pub fn reachable(&self, id: u64) -> HashSet<u64> {
        self.reachable_many([id])
    }

    /// The transitive closure over a set of seed ids; equivalent to the
    /// union of `reachable` over each seed but shares one worklist.
    pub fn reachable_many(&self, ids: impl IntoIterator<Item = u64>) -> HashSet<u64> {
        let mut seen = HashSet::new();
        let mut worklist: Vec<u64> = Vec::new();

        for id in ids {
            if self.index.contains_key(&id) && seen.insert(id) {
                worklist.push(id);
            }
        }

        while let Some(current) = worklist.pop() {
            if let Some(entity) = self.lookup(current) {
                for &next in entity.out_refs() {
                    if self.index.contains_key(&next) && seen.insert(next) {
                        worklist.push(next);
                    }
                }
            }
        }

        seen
    }

    /// All entities that reference `id` directly.
    pub fn referents(&self, id: u64) -> HashSet<u64> {
        self.entities
            .iter()
            .filter(|e| e.out_refs.contains(&id))
            .map(|e| e.id)
            .collect()
    }
}

/// Internal states for scanning STEP record text for `#<digits>`
/// reference tokens. Quoted-string contents get no special treatment per
/// the data model: conformant ISO-10303-21 text never embeds an unescaped
/// `#` inside a string, so raw scanning is safe.
#[derive(PartialEq)]
enum ScanMode {
    Normal,
    Reference,
}

/// Invokes `f` for every `#<digits>` reference token found in `text`.
pub(crate) fn for_each_reference(text: &str, mut f: impl FnMut(u64)) {
    let mut mode = ScanMode::Normal;
    let mut buffer = String::new();

    for ch in text.chars() {
        match mode {
            ScanMode::Normal => {
                if ch == '#' {
                    mode = ScanMode::Reference;
                }
            }
            ScanMode::Reference => {
                if ch.is_ascii_digit() {
                    buffer.push(ch);
                    continue;
                }

                if let Ok(id) = buffer.parse() {
                    f(id);
                }
                buffer.clear();

                mode = if ch == '#' {
                    ScanMode::Reference
                } else {
                    ScanMode::Normal
                };
            }
        }
    }

    if !buffer.is_empty() {
        if let Ok(id) = buffer.parse() {
            f(id);
        }
    }
}

/// Rewrites every `#<digits>` token in `text` using `map`. Tokens whose id
/// is not present in `map` (dangling references) are left unchanged.
pub(crate) fn rewrite_references(text: &str, map: &HashMap<u64, u64>) -> String {
    let mut mode = ScanMode::Normal;
    let mut buffer = String::new();
    let mut result = String::with_capacity(text.len());

    let flush = |buffer: &mut String, result: &mut String| {
        if buffer.is_empty() {
            return;
        }
        match buffer.parse::<u64>().ok().and_then(|id| map.get(&id)) {
            Some(new_id) => result.push_str(&new_id.to_string()),
            None => result.push_str(buffer),
        }
        buffer.clear();
    };

    for ch in text.chars() {
        match mode {
            ScanMode::Normal => {
                result.push(ch);
                if ch == '#' {
                    mode = ScanMode::Reference;
                }
            }
            ScanMode::Reference => {
                if ch.is_ascii_digit() {
                    buffer.push(ch);
                    continue;
                }

                flush(&mut buffer, &mut result);
                result.push(ch);

                mode = if ch == '#' {
                    ScanMode::Reference
                } else {
                    ScanMode::Normal
                };
            }
        }
    }

    flush(&mut buffer, &mut result);

    result
}

/// Returns the first single-quoted string literal in `text`.
pub(crate) fn first_quoted_string(text: &str) -> Option<&str> {
    let start = text.find('\'')?;
    let rest = &text[start + 1..];
    let end = rest.find('\'')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entity_out_refs_excludes_self_and_dedups() {
        let entity = Entity::new(
            5,
            "FOO".to_string(),
            "'name',#2,#3,#2".to_string(),
            "#5=FOO('name',#2,#3,#2);".to_string(),
        );

        assert_eq!(entity.out_refs(), &[2, 3]);
    }

    #[test]
    fn entity_treats_hash_inside_strings_as_a_reference_per_spec() {
        // Quoted-string contents get no special treatment (§4.1): a `#`
        // followed by digits inside a string is still counted.
        let entity = Entity::new(
            1,
            "FOO".to_string(),
            "'A#99 name',#2".to_string(),
            "#1=FOO('A#99 name',#2);".to_string(),
        );

        assert_eq!(entity.out_refs(), &[99, 2]);
    }

    #[test]
    fn graph_reachable_follows_transitive_refs() {
        let mut graph = Graph::new();
        graph.insert(Entity::new(1, "A".into(), "#2".into(), "#1=A(#2);".into()));
        graph.insert(Entity::new(2, "B".into(), "#3".into(), "#2=B(#3);".into()));
        graph.insert(Entity::new(3, "C".into(), "".into(), "#3=C();".into()));
        graph.insert(Entity::new(4, "D".into(), "".into(), "#4=D();".into()));

        let reachable = graph.reachable(1);
        assert_eq!(reachable, [1, 2, 3].into_iter().collect());
    }

    #[test]
    fn graph_reachable_tolerates_cycles() {
        let mut graph = Graph::new();
        graph.insert(Entity::new(1, "A".into(), "#2".into(), "#1=A(#2);".into()));
        graph.insert(Entity::new(2, "B".into(), "#1".into(), "#2=B(#1);".into()));

        assert_eq!(graph.reachable(1), [1, 2].into_iter().collect());
    }

    #[test]
    fn graph_reachable_ignores_dangling_refs() {
        let mut graph = Graph::new();
        graph.insert(Entity::new(1, "A".into(), "#99".into(), "#1=A(#99);".into()));

        assert_eq!(graph.reachable(1), [1].into_iter().collect());
    }

    #[test]
    fn graph_by_type_preserves_insertion_order() {
        let mut graph = Graph::new();
        graph.insert(Entity::new(3, "T".into(), "".into(), "#3=T();".into()));
        graph.insert(Entity::new(1, "T".into(), "".into(), "#1=T();".into()));

        assert_eq!(graph.by_type("T"), &[3, 1]);
    }

    #[test]
    fn graph_referents_finds_back_references() {
        let mut graph = Graph::new();
        graph.insert(Entity::new(1, "A".into(), "#2".into(), "#1=A(#2);".into()));
        graph.insert(Entity::new(2, "B".into(), "".into(), "#2=B();".into()));

        assert_eq!(graph.referents(2), [1].into_iter().collect());
    }

    #[test]
    fn rewrite_references_maps_known_ids_and_preserves_dangling() {
        let mut map = HashMap::new();
        map.insert(1u64, 100u64);
        map.insert(2u64, 200u64);

        let rewritten = rewrite_references("#1=FOO(#2,#2,#999);", &map);
        assert_eq!(rewritten, "#100=FOO(#200,#200,#999);");
    }

    #[test]
    fn rewrite_references_rewrites_hash_in_strings_too() {
        // No special treatment of quoted strings (§4.1): a `#<digits>`
        // token inside a string is rewritten the same as anywhere else.
        let mut map = HashMap::new();
        map.insert(1u64, 7u64);

        let rewritten = rewrite_references("#1=FOO('No #1 here');", &map);
        assert_eq!(rewritten, "#7=FOO('No #7 here');");
    }

    #[test]
    fn first_quoted_string_extracts_first_literal() {
        assert_eq!(first_quoted_string("'NAME','DESC'"), Some("NAME"));
        assert_eq!(first_quoted_string("$,$"), None);
    }
}
