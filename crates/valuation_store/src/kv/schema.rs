//! Table and index layout of the key-value backend.

use finbench_valuation_core::FilterField;

pub const ATTR_FAMILY: &str = "NomeFamilia";
pub const ATTR_SERIES: &str = "NomeSerie";
pub const ATTR_ATTRIBUTE: &str = "NomeAtributo";
pub const ATTR_ATTRIBUTE_DATE: &str = "NomeAtributoDataInicioVigencia";
pub const ATTR_SOURCE_FILE: &str = "NomeArquivo";
pub const ATTR_AMOUNT: &str = "ValorAtivo";
pub const ATTR_VALID_FROM: &str = "DataInicioVigencia";
pub const ATTR_VALID_TO: &str = "DataFimVigencia";
pub const ATTR_UPDATED_AT: &str = "DataAtualizacao";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySchema {
    pub partition: &'static str,
    pub sort: &'static str,
}

impl KeySchema {
    pub fn attributes(&self) -> [&'static str; 2] {
        [self.partition, self.sort]
    }
}

pub const TABLE_KEY: KeySchema = KeySchema {
    partition: ATTR_SERIES,
    sort: ATTR_ATTRIBUTE_DATE,
};

/// Global secondary indexes provisioned on the valuation table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecondaryIndex {
    FamilyDate,
    SeriesFamily,
    SeriesAttribute,
    SeriesDate,
}

impl SecondaryIndex {
    pub const ALL: [SecondaryIndex; 4] = [
        SecondaryIndex::FamilyDate,
        SecondaryIndex::SeriesFamily,
        SecondaryIndex::SeriesAttribute,
        SecondaryIndex::SeriesDate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SecondaryIndex::FamilyDate => "GsiBuscaFamilia",
            SecondaryIndex::SeriesFamily => "BuscarFamilia",
            SecondaryIndex::SeriesAttribute => "BuscarAtributo",
            SecondaryIndex::SeriesDate => "BuscarDataInicioVigencia",
        }
    }

    pub fn key_schema(self) -> KeySchema {
        match self {
            SecondaryIndex::FamilyDate => KeySchema {
                partition: ATTR_FAMILY,
                sort: ATTR_VALID_FROM,
            },
            SecondaryIndex::SeriesFamily => KeySchema {
                partition: ATTR_SERIES,
                sort: ATTR_FAMILY,
            },
            SecondaryIndex::SeriesAttribute => KeySchema {
                partition: ATTR_SERIES,
                sort: ATTR_ATTRIBUTE,
            },
            SecondaryIndex::SeriesDate => KeySchema {
                partition: ATTR_SERIES,
                sort: ATTR_VALID_FROM,
            },
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|index| index.name() == name)
    }
}

/// Item attribute holding the value a filter field compares against.
pub fn attribute_for(field: FilterField) -> &'static str {
    match field {
        FilterField::Family => ATTR_FAMILY,
        FilterField::Series => ATTR_SERIES,
        FilterField::Attribute => ATTR_ATTRIBUTE,
        FilterField::CompositeAttributeDate => ATTR_ATTRIBUTE_DATE,
        FilterField::ValidFrom => ATTR_VALID_FROM,
        FilterField::ValidTo => ATTR_VALID_TO,
    }
}
