//! Codificación de apelaciones canónicas en vectores de características de
//! ancho fijo.
//!
//! El `EncodingSchema` se congela al entrenar y viaja dentro del snapshot, de
//! modo que la inferencia usa exactamente los mismos códigos que el
//! entrenamiento. Los valores no vistos van a un código reservado por campo.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{calendar_codes, CanonicalAppeal};

/// Código entero de un valor categórico.
pub type Code = u16;

pub const DAYS_OF_WEEK: usize = 7;
pub const MONTHS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("el campo '{field}' supera los {limit} valores distintos que admite su código")]
    TooManyValues { field: &'static str, limit: usize },
}

/// Columnas de la representación de características.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    District,
    Category,
    DayOfWeek,
    Month,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::District, Field::Category, Field::DayOfWeek, Field::Month];

    pub fn position(self) -> usize {
        match self {
            Field::District => 0,
            Field::Category => 1,
            Field::DayOfWeek => 2,
            Field::Month => 3,
        }
    }
}

/// Lista ordenada de valores observados de un campo categórico. El índice de
/// cada valor es su posición; el código `len()` queda reservado para lo no
/// visto.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CategoryIndex {
    values: Vec<String>,
    lookup: HashMap<String, Code>,
}

impl CategoryIndex {
    /// Mayor número de valores observados: el último código es el reservado.
    pub const MAX_VALUES: usize = Code::MAX as usize;

    fn insert(&mut self, value: &str, field: &'static str) -> Result<(), EncodingError> {
        // Misma clave que usa `code`.
        let value = value.trim();
        if self.lookup.contains_key(value) {
            return Ok(());
        }
        let code = Code::try_from(self.values.len())
            .ok()
            .filter(|code| *code < Code::MAX)
            .ok_or(EncodingError::TooManyValues {
                field,
                limit: Self::MAX_VALUES,
            })?;
        self.values.push(value.to_string());
        self.lookup.insert(value.to_string(), code);
        Ok(())
    }

    /// Código del valor, o el reservado si no se observó al entrenar.
    pub fn code(&self, value: &str) -> Code {
        self.lookup
            .get(value.trim())
            .copied()
            .unwrap_or_else(|| self.unseen_code())
    }

    pub fn unseen_code(&self) -> Code {
        self.values.len() as Code
    }

    /// Número de códigos posibles, incluido el reservado.
    pub fn cardinality(&self) -> usize {
        self.values.len() + 1
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn value(&self, code: Code) -> Option<&str> {
        self.values.get(code as usize).map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for CategoryIndex {
    type Error = EncodingError;

    fn try_from(values: Vec<String>) -> Result<Self, Self::Error> {
        let mut index = CategoryIndex::default();
        for value in &values {
            index.insert(value, "artefacto")?;
        }
        Ok(index)
    }
}

impl From<CategoryIndex> for Vec<String> {
    fn from(index: CategoryIndex) -> Self {
        index.values
    }
}

/// Esquema de codificación congelado en tiempo de entrenamiento.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingSchema {
    pub districts: CategoryIndex,
    pub categories: CategoryIndex,
}

impl EncodingSchema {
    /// Asigna índices en orden de primera aparición, así dos ajustes sobre
    /// el mismo corpus ordenado producen el mismo esquema.
    pub fn fit(appeals: &[CanonicalAppeal]) -> Result<Self, EncodingError> {
        let mut schema = EncodingSchema::default();
        for appeal in appeals {
            schema.districts.insert(&appeal.district, "district")?;
            schema.categories.insert(&appeal.category, "category")?;
        }
        Ok(schema)
    }

    pub fn transform(&self, appeal: &CanonicalAppeal) -> FeatureVector {
        FeatureVector {
            district: self.districts.code(&appeal.district),
            category: self.categories.code(&appeal.category),
            day_of_week: appeal.day_of_week.min(DAYS_OF_WEEK as u8 - 1),
            month: appeal.month.clamp(1, MONTHS as u8) - 1,
        }
    }

    /// Codifica una entrada de inferencia. Nunca falla.
    pub fn encode(&self, district: &str, category: &str, at: &DateTime<Utc>) -> FeatureVector {
        let (day_of_week, month) = calendar_codes(at);
        FeatureVector {
            district: self.districts.code(district),
            category: self.categories.code(category),
            day_of_week,
            month: month - 1,
        }
    }

    pub fn transform_batch(&self, appeals: &[CanonicalAppeal]) -> FeatureMatrix {
        let mut matrix = FeatureMatrix::with_capacity(appeals.len());
        for appeal in appeals {
            matrix.push(self.transform(appeal));
        }
        matrix
    }

    pub fn cardinality(&self, field: Field) -> usize {
        match field {
            Field::District => self.districts.cardinality(),
            Field::Category => self.categories.cardinality(),
            Field::DayOfWeek => DAYS_OF_WEEK,
            Field::Month => MONTHS,
        }
    }

    /// Cardinalidades en el orden de `Field::ALL`.
    pub fn cardinalities(&self) -> [usize; 4] {
        Field::ALL.map(|field| self.cardinality(field))
    }
}

/// Vector de características de una apelación. `month` va de 0 a 11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureVector {
    pub district: Code,
    pub category: Code,
    pub day_of_week: u8,
    pub month: u8,
}

impl FeatureVector {
    pub fn code(&self, field: Field) -> usize {
        match field {
            Field::District => self.district as usize,
            Field::Category => self.category as usize,
            Field::DayOfWeek => self.day_of_week as usize,
            Field::Month => self.month as usize,
        }
    }
}

/// Lote de vectores almacenado por columnas, sin conservar los textos
/// originales.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureMatrix {
    districts: Vec<Code>,
    categories: Vec<Code>,
    days_of_week: Vec<u8>,
    months: Vec<u8>,
}

impl FeatureMatrix {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            districts: Vec::with_capacity(rows),
            categories: Vec::with_capacity(rows),
            days_of_week: Vec::with_capacity(rows),
            months: Vec::with_capacity(rows),
        }
    }

    pub fn push(&mut self, row: FeatureVector) {
        self.districts.push(row.district);
        self.categories.push(row.category);
        self.days_of_week.push(row.day_of_week);
        self.months.push(row.month);
    }

    pub fn len(&self) -> usize {
        self.districts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.districts.is_empty()
    }

    pub fn row(&self, index: usize) -> FeatureVector {
        FeatureVector {
            district: self.districts[index],
            category: self.categories[index],
            day_of_week: self.days_of_week[index],
            month: self.months[index],
        }
    }

    pub fn code(&self, field: Field, index: usize) -> usize {
        match field {
            Field::District => self.districts[index] as usize,
            Field::Category => self.categories[index] as usize,
            Field::DayOfWeek => self.days_of_week[index] as usize,
            Field::Month => self.months[index] as usize,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = FeatureVector> + '_ {
        (0..self.len()).map(|index| self.row(index))
    }

    /// Bytes que ocupan las columnas (sin contar la capacidad sobrante).
    pub fn approx_bytes(&self) -> usize {
        self.len() * (2 * std::mem::size_of::<Code>() + 2 * std::mem::size_of::<u8>())
    }
}

impl FromIterator<FeatureVector> for FeatureMatrix {
    fn from_iter<I: IntoIterator<Item = FeatureVector>>(iter: I) -> Self {
        let mut matrix = FeatureMatrix::default();
        for row in iter {
            matrix.push(row);
        }
        matrix
    }
}
