use crate::compressibility::apply_compressibility;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{Binary, Bson, Document};
use ycsb::{FieldMap, FieldSet};

/// Field holding the record key.
pub const ID_FIELD: &str = "_id";

const INCLUDE: i32 = 1;
const ASCENDING: i32 = 1;

/// Parameters of a find: filter plus the optional projection, sort and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindRequest {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub limit: Option<i64>,
}

impl FindRequest {
    pub fn new(filter: Document) -> FindRequest {
        FindRequest {
            filter,
            ..Default::default()
        }
    }

    pub fn projection(mut self, projection: Option<Document>) -> Self {
        self.projection = projection;
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Wraps raw bytes as a generic BSON binary.
#[inline]
pub fn binary(bytes: Vec<u8>) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    })
}

/// `{_id: key, field: Binary(shaped value), ...}`
pub fn record_document(key: &str, values: &FieldMap, compressibility: f64) -> Document {
    let mut document = Document::new();
    document.insert(ID_FIELD, key);
    document.extend(shaped_fields(values, compressibility));
    document
}

/// `{_id: key}`
pub fn id_filter(key: &str) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD, key);
    filter
}

/// `{_id: {$gte: start_key}}`
pub fn range_filter(start_key: &str) -> Document {
    let mut range = Document::new();
    range.insert("$gte", start_key);
    let mut filter = Document::new();
    filter.insert(ID_FIELD, range);
    filter
}

/// `{_id: 1}`
pub fn ascending_by_id() -> Document {
    let mut sort = Document::new();
    sort.insert(ID_FIELD, ASCENDING);
    sort
}

/// `{field: 1, ...}` in field-name order.
pub fn projection(fields: &FieldSet) -> Document {
    let mut names: Vec<&String> = fields.iter().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| (name.clone(), Bson::Int32(INCLUDE)))
        .collect()
}

/// `{$set: {field: Binary(shaped value), ...}}`
pub fn set_update(values: &FieldMap, compressibility: f64) -> Document {
    let fields = shaped_fields(values, compressibility);
    let mut update = Document::new();
    update.insert("$set", fields);
    update
}

/// Copies every binary-valued field of `document` into `result`.
///
/// Non-binary values, `_id` included, are not record fields and are skipped.
pub fn fill_field_map(result: &mut FieldMap, document: &Document) {
    for (name, value) in document {
        if let Bson::Binary(binary) = value {
            result.insert(name.clone(), binary.bytes.clone());
        }
    }
}

fn shaped_fields(values: &FieldMap, compressibility: f64) -> Document {
    values
        .iter()
        .map(|(name, value)| {
            let shaped = apply_compressibility(value.clone(), compressibility);
            (name.clone(), binary(shaped))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn values(pairs: &[(&str, &[u8])]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect()
    }

    #[test]
    fn test_record_document_has_key_first_and_binary_fields() {
        let document = record_document("user1", &values(&[("field0", b"abcd")]), 1.0);
        assert_eq!(document.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(document.get_str("_id").unwrap(), "user1");
        assert_eq!(document.get("field0"), Some(&binary(b"abcd".to_vec())));
    }

    #[test]
    fn test_record_document_applies_compressibility() {
        let document = record_document("k", &values(&[("f", b"abcd")]), 2.0);
        assert_eq!(document.get("f"), Some(&binary(vec![0, 0, b'c', b'd'])));
    }

    #[test]
    fn test_filters() {
        assert_eq!(id_filter("user7"), doc! { "_id": "user7" });
        assert_eq!(range_filter("user3"), doc! { "_id": { "$gte": "user3" } });
        assert_eq!(ascending_by_id(), doc! { "_id": 1 });
    }

    #[test]
    fn test_projection_includes_each_field() {
        let fields: FieldSet = ["field2", "field0"].iter().map(|s| s.to_string()).collect();
        assert_eq!(projection(&fields), doc! { "field0": 1, "field2": 1 });
    }

    #[test]
    fn test_set_update() {
        let update = set_update(&values(&[("field1", b"xy")]), 1.0);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get("field1"), Some(&binary(b"xy".to_vec())));
        assert_eq!(update.len(), 1);
    }

    #[test]
    fn test_fill_field_map_skips_non_binary() {
        let mut document = doc! { "_id": "user1", "count": 3 };
        document.insert("field0", binary(b"v0".to_vec()));

        let mut result = FieldMap::new();
        fill_field_map(&mut result, &document);

        assert_eq!(result.len(), 1);
        assert_eq!(result.get("field0"), Some(&b"v0".to_vec()));
    }

    #[test]
    fn test_find_request_builder() {
        let request = FindRequest::new(range_filter("a"))
            .projection(None)
            .sort(ascending_by_id())
            .limit(10);
        assert_eq!(request.limit, Some(10));
        assert_eq!(request.sort, Some(doc! { "_id": 1 }));
        assert!(request.projection.is_none());
    }
}
