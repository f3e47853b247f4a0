// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lazy STEP instance decoding
//!
//! The file is indexed once by byte range; only the instances reachable
//! from the B-rep roots are ever tokenized.

use crate::error::{Error, Result};
use crate::parser::{entity_type_name, parse_entity, EntityScanner, Token};
use nalgebra::Point3;
use rustc_hash::FxHashMap;

/// Instance id to `(start, end)` byte range of its record
pub type EntityIndex = FxHashMap<u32, (usize, usize)>;

/// Index every `#id = ...;` record in `content`. A later duplicate id wins.
pub fn build_entity_index(content: &str) -> EntityIndex {
    let mut index = FxHashMap::with_capacity_and_hasher(content.len() / 64, Default::default());
    let mut scanner = EntityScanner::new(content);
    while let Some((id, _, start, end)) = scanner.next_entity() {
        index.insert(id, (start, end));
    }
    index
}

/// A tokenized STEP instance borrowing from the file content
#[derive(Debug, Clone)]
pub struct DecodedEntity<'a> {
    pub id: u32,
    pub type_name: &'a str,
    pub args: Vec<Token<'a>>,
}

impl<'a> DecodedEntity<'a> {
    /// Attribute at `index`, or a malformed-entity error naming the slot
    pub fn arg(&self, index: usize) -> Result<&Token<'a>> {
        self.args.get(index).ok_or_else(|| {
            Error::malformed(self.id, self.type_name, format!("missing attribute {}", index))
        })
    }

    pub fn ref_at(&self, index: usize) -> Result<u32> {
        self.arg(index)?.as_entity_ref().ok_or_else(|| {
            Error::malformed(self.id, self.type_name, format!("attribute {} is not a reference", index))
        })
    }

    /// References inside a list attribute; non-reference items are skipped
    pub fn refs_at(&self, index: usize) -> Result<Vec<u32>> {
        let list = self.arg(index)?.as_list().ok_or_else(|| {
            Error::malformed(self.id, self.type_name, format!("attribute {} is not a list", index))
        })?;
        Ok(list.iter().filter_map(Token::as_entity_ref).collect())
    }

    pub fn f64_at(&self, index: usize) -> Result<f64> {
        self.arg(index)?.as_f64().ok_or_else(|| {
            Error::malformed(self.id, self.type_name, format!("attribute {} is not numeric", index))
        })
    }

    /// Logical flag; unset or unknown values default to `true`
    pub fn bool_at(&self, index: usize) -> bool {
        self.args
            .get(index)
            .and_then(Token::as_bool)
            .unwrap_or(true)
    }
}

/// Random access to instances by id, tokenizing on demand
pub struct EntityDecoder<'a> {
    content: &'a str,
    entity_index: EntityIndex,
    /// Cache of cartesian point coordinates; points are shared by many edges
    point_cache: FxHashMap<u32, Point3<f64>>,
}

impl<'a> EntityDecoder<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            entity_index: build_entity_index(content),
            point_cache: FxHashMap::default(),
        }
    }

    /// Number of indexed instances
    pub fn len(&self) -> usize {
        self.entity_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_index.is_empty()
    }

    pub fn decode_by_id(&self, entity_id: u32) -> Result<DecodedEntity<'a>> {
        let (offset, end) = self
            .entity_index
            .get(&entity_id)
            .copied()
            .ok_or(Error::EntityNotFound(entity_id))?;
        let record = &self.content[offset..end];
        let (id, type_name, args) = parse_entity(record).map_err(|e| {
            let excerpt: String = record.chars().take(100).collect();
            Error::parse(offset, format!("{} in {:?}", e, excerpt))
        })?;

        Ok(DecodedEntity { id, type_name, args })
    }

    /// Decode a `CARTESIAN_POINT` (2D points get z = 0), cached by ID
    pub fn point(&mut self, entity_id: u32) -> Result<Point3<f64>> {
        if let Some(point) = self.point_cache.get(&entity_id) {
            return Ok(*point);
        }

        let entity = self.decode_by_id(entity_id)?;
        if entity.type_name != "CARTESIAN_POINT" {
            return Err(Error::malformed(entity.id, entity.type_name, "expected CARTESIAN_POINT"));
        }
        let coords = entity
            .arg(1)?
            .as_list()
            .ok_or_else(|| Error::malformed(entity.id, entity.type_name, "coordinates are not a list"))?;
        let values: Vec<f64> = coords.iter().filter_map(Token::as_f64).collect();
        if values.len() < 2 {
            return Err(Error::malformed(entity.id, entity.type_name, "fewer than two coordinates"));
        }

        let point = Point3::new(values[0], values[1], values.get(2).copied().unwrap_or(0.0));
        self.point_cache.insert(entity_id, point);
        Ok(point)
    }

    /// Decode a `DIRECTION` as raw ratios (not normalized)
    pub fn direction(&self, entity_id: u32) -> Result<[f64; 3]> {
        let entity = self.decode_by_id(entity_id)?;
        let ratios = entity
            .arg(1)?
            .as_list()
            .ok_or_else(|| Error::malformed(entity.id, entity.type_name, "ratios are not a list"))?;
        let values: Vec<f64> = ratios.iter().filter_map(Token::as_f64).collect();
        if values.len() < 2 {
            return Err(Error::malformed(entity.id, entity.type_name, "fewer than two ratios"));
        }
        Ok([values[0], values[1], values.get(2).copied().unwrap_or(0.0)])
    }

    /// Undecoded record text, including the trailing `;`
    pub fn get_raw_content(&self, entity_id: u32) -> Option<&'a str> {
        let (start, end) = self.entity_index.get(&entity_id).copied()?;
        Some(&self.content[start..end])
    }

    /// IDs of all instances whose type name matches, in ascending ID order
    pub fn ids_of_type(&self, type_name: &str) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .entity_index
            .iter()
            .filter(|(_, &(start, end))| {
                entity_type_name(&self.content[start..end]) == Some(type_name)
            })
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = r#"
DATA;
#1=CARTESIAN_POINT('',(1.,2.,3.));
#2 = CARTESIAN_POINT ( 'NONE', ( 4.0, 5.0 ) ) ;
#3=DIRECTION('',(0.,0.,1.));
#4=VERTEX_POINT('',#1);
ENDSEC;
"#;

    #[test]
    fn test_index_finds_spaced_ids() {
        let index = build_entity_index(CONTENT);
        assert_eq!(index.len(), 4);
        assert!(index.contains_key(&2));
    }

    #[test]
    fn test_index_skips_hash_inside_header_strings() {
        let content = "HEADER;\nFILE_NAME('duct #3.step','',(''),(''),'','','');\nENDSEC;\nDATA;\n#3=DIRECTION('',(1.,0.,0.));\n";
        let index = build_entity_index(content);
        assert_eq!(index.keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_point_decoding_and_2d_promotion() {
        let mut decoder = EntityDecoder::new(CONTENT);
        let p = decoder.point(1).unwrap();
        assert_eq!((p.x, p.y, p.z), (1.0, 2.0, 3.0));
        let q = decoder.point(2).unwrap();
        assert_eq!(q.z, 0.0);
    }

    #[test]
    fn test_point_rejects_wrong_type() {
        let mut decoder = EntityDecoder::new(CONTENT);
        assert!(matches!(decoder.point(4), Err(Error::MalformedEntity { .. })));
        assert!(matches!(decoder.point(99), Err(Error::EntityNotFound(99))));
    }

    #[test]
    fn test_ids_of_type() {
        let decoder = EntityDecoder::new(CONTENT);
        assert_eq!(decoder.ids_of_type("CARTESIAN_POINT"), vec![1, 2]);
        assert_eq!(decoder.direction(3).unwrap(), [0.0, 0.0, 1.0]);
    }
}
