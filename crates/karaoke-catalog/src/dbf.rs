use std::{fs, path::Path};

use tracing::{Level, debug, instrument};

use crate::{error::Error, text::decode_field};

const HEADER_LEN: usize = 32;
const FIELD_DESCRIPTOR_LEN: usize = 32;
const FIELD_TERMINATOR: u8 = 0x0D;
const DELETED_FLAG: u8 = b'*';

/// Descriptor de una columna del catálogo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbfField {
    pub name: String,
    pub kind: char,
    pub length: usize,
}

/// Tabla dBASE cargada en memoria (`Data/SONG.DBF`).
#[derive(Debug, Clone)]
pub struct DbfTable {
    bytes: Vec<u8>,
    record_count: usize,
    header_length: usize,
    record_length: usize,
    fields: Vec<DbfField>,
}

impl DbfTable {
    #[instrument(level = Level::DEBUG, err)]
    pub fn open(path: &Path) -> Result<Self, Error> {
        let bytes = fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(bytes)
    }

    pub fn parse(bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let record_count = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let header_length = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let record_length = u16::from_le_bytes([bytes[10], bytes[11]]) as usize;

        if header_length < HEADER_LEN + 1 {
            return Err(Error::InvalidHeader("header length shorter than the fixed header"));
        }
        if header_length > bytes.len() {
            return Err(Error::Truncated {
                expected: header_length,
                actual: bytes.len(),
            });
        }
        if record_length == 0 {
            return Err(Error::InvalidHeader("record length is zero"));
        }

        let field_count = (header_length - HEADER_LEN - 1) / FIELD_DESCRIPTOR_LEN;
        let mut fields = Vec::with_capacity(field_count);
        for i in 0..field_count {
            let start = HEADER_LEN + i * FIELD_DESCRIPTOR_LEN;
            let desc = &bytes[start..start + FIELD_DESCRIPTOR_LEN];
            if desc[0] == FIELD_TERMINATOR {
                break;
            }
            let name_end = desc[..11].iter().position(|&b| b == 0).unwrap_or(11);
            fields.push(DbfField {
                name: String::from_utf8_lossy(&desc[..name_end]).trim().to_string(),
                kind: desc[11] as char,
                length: desc[16] as usize,
            });
        }

        let row_width: usize = 1 + fields.iter().map(|f| f.length).sum::<usize>();
        if row_width > record_length {
            return Err(Error::InvalidHeader("fields are wider than the record length"));
        }

        debug!(record_count, fields = fields.len(), "catalog header parsed");

        Ok(Self {
            bytes,
            record_count,
            header_length,
            record_length,
            fields,
        })
    }

    pub fn fields(&self) -> &[DbfField] {
        &self.fields
    }

    /// Número de registros declarado en la cabecera (incluye borrados).
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Registros vivos en orden de tabla. Los marcados como borrados se saltan;
    /// un registro que no cabe en el fichero corta la iteración.
    pub fn records(&self) -> Records<'_> {
        Records { table: self, row: 0 }
    }
}

/// Fila del catálogo con sus valores ya decodificados.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Posición física en la tabla.
    pub row: usize,
    values: Vec<(String, String)>,
}

impl CatalogRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value.as_str())
    }
}

pub struct Records<'a> {
    table: &'a DbfTable,
    row: usize,
}

impl Iterator for Records<'_> {
    type Item = CatalogRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let t = self.table;
        while self.row < t.record_count {
            let row = self.row;
            self.row += 1;

            let start = t.header_length + row * t.record_length;
            let end = start + t.record_length;
            if end > t.bytes.len() {
                self.row = t.record_count;
                return None;
            }
            let raw = &t.bytes[start..end];
            if raw[0] == DELETED_FLAG {
                continue;
            }

            let mut offset = 1;
            let values = t
                .fields
                .iter()
                .map(|f| {
                    let value = decode_field(&raw[offset..offset + f.length]);
                    offset += f.length;
                    (f.name.clone(), value)
                })
                .collect();

            return Some(CatalogRecord { row, values });
        }
        None
    }
}
