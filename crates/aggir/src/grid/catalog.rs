use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The seventeen variables of the AGGIR grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Variable {
    Coherence,
    Orientation,
    Toilette,
    Habillage,
    Alimentation,
    Elimination,
    Transferts,
    DeplacementInterieur,
    DeplacementExterieur,
    Alerter,
    Cuisine,
    Menage,
    Transports,
    Achats,
    SuiviTraitement,
    ActivitesTempsLibre,
    Gestion,
}

impl Variable {
    pub const ALL: [Variable; 17] = [
        Variable::Coherence,
        Variable::Orientation,
        Variable::Toilette,
        Variable::Habillage,
        Variable::Alimentation,
        Variable::Elimination,
        Variable::Transferts,
        Variable::DeplacementInterieur,
        Variable::DeplacementExterieur,
        Variable::Alerter,
        Variable::Cuisine,
        Variable::Menage,
        Variable::Transports,
        Variable::Achats,
        Variable::SuiviTraitement,
        Variable::ActivitesTempsLibre,
        Variable::Gestion,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Variable::Coherence => "COHERENCE",
            Variable::Orientation => "ORIENTATION",
            Variable::Toilette => "TOILETTE",
            Variable::Habillage => "HABILLAGE",
            Variable::Alimentation => "ALIMENTATION",
            Variable::Elimination => "ELIMINATION",
            Variable::Transferts => "TRANSFERTS",
            Variable::DeplacementInterieur => "DEPLACEMENT_INTERIEUR",
            Variable::DeplacementExterieur => "DEPLACEMENT_EXTERIEUR",
            Variable::Alerter => "ALERTER",
            Variable::Cuisine => "CUISINE",
            Variable::Menage => "MENAGE",
            Variable::Transports => "TRANSPORTS",
            Variable::Achats => "ACHATS",
            Variable::SuiviTraitement => "SUIVI_TRAITEMENT",
            Variable::ActivitesTempsLibre => "ACTIVITES_TEMPS_LIBRE",
            Variable::Gestion => "GESTION",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Variable {
    type Err = UnknownCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let code = value.trim();
        Variable::ALL
            .into_iter()
            .find(|variable| variable.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| UnknownCode(value.to_string()))
    }
}

/// The twenty-four answerable items. Simple variables answer through a
/// sub-variable carrying the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubVariable {
    Communication,
    Comportement,
    Temps,
    Espace,
    ToiletteHaut,
    ToiletteBas,
    HabillageHaut,
    HabillageMoyen,
    HabillageBas,
    SeServir,
    Manger,
    Urinaire,
    Fecale,
    Transferts,
    DeplacementInterieur,
    DeplacementExterieur,
    Alerter,
    Cuisine,
    Menage,
    Transports,
    Achats,
    SuiviTraitement,
    ActivitesTempsLibre,
    Gestion,
}

impl SubVariable {
    pub const ALL: [SubVariable; 24] = [
        SubVariable::Communication,
        SubVariable::Comportement,
        SubVariable::Temps,
        SubVariable::Espace,
        SubVariable::ToiletteHaut,
        SubVariable::ToiletteBas,
        SubVariable::HabillageHaut,
        SubVariable::HabillageMoyen,
        SubVariable::HabillageBas,
        SubVariable::SeServir,
        SubVariable::Manger,
        SubVariable::Urinaire,
        SubVariable::Fecale,
        SubVariable::Transferts,
        SubVariable::DeplacementInterieur,
        SubVariable::DeplacementExterieur,
        SubVariable::Alerter,
        SubVariable::Cuisine,
        SubVariable::Menage,
        SubVariable::Transports,
        SubVariable::Achats,
        SubVariable::SuiviTraitement,
        SubVariable::ActivitesTempsLibre,
        SubVariable::Gestion,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            SubVariable::Communication => "COMMUNICATION",
            SubVariable::Comportement => "COMPORTEMENT",
            SubVariable::Temps => "TEMPS",
            SubVariable::Espace => "ESPACE",
            SubVariable::ToiletteHaut => "TOILETTE_HAUT",
            SubVariable::ToiletteBas => "TOILETTE_BAS",
            SubVariable::HabillageHaut => "HABILLAGE_HAUT",
            SubVariable::HabillageMoyen => "HABILLAGE_MOYEN",
            SubVariable::HabillageBas => "HABILLAGE_BAS",
            SubVariable::SeServir => "SE_SERVIR",
            SubVariable::Manger => "MANGER",
            SubVariable::Urinaire => "URINAIRE",
            SubVariable::Fecale => "FECALE",
            SubVariable::Transferts => "TRANSFERTS",
            SubVariable::DeplacementInterieur => "DEPLACEMENT_INTERIEUR",
            SubVariable::DeplacementExterieur => "DEPLACEMENT_EXTERIEUR",
            SubVariable::Alerter => "ALERTER",
            SubVariable::Cuisine => "CUISINE",
            SubVariable::Menage => "MENAGE",
            SubVariable::Transports => "TRANSPORTS",
            SubVariable::Achats => "ACHATS",
            SubVariable::SuiviTraitement => "SUIVI_TRAITEMENT",
            SubVariable::ActivitesTempsLibre => "ACTIVITES_TEMPS_LIBRE",
            SubVariable::Gestion => "GESTION",
        }
    }
}

impl fmt::Display for SubVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SubVariable {
    type Err = UnknownCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let code = value.trim();
        SubVariable::ALL
            .into_iter()
            .find(|sub| sub.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| UnknownCode(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not an AGGIR identifier")]
pub struct UnknownCode(pub String);

/// Whether a variable takes part in the GIR computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableRole {
    Discriminant,
    Illustrative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubVariableDef {
    pub code: SubVariable,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDef {
    pub code: Variable,
    pub label: String,
    pub role: VariableRole,
    pub sub_variables: Vec<SubVariableDef>,
}

impl VariableDef {
    pub fn is_discriminant(&self) -> bool {
        self.role == VariableRole::Discriminant
    }

    pub fn is_composite(&self) -> bool {
        self.sub_variables.len() > 1
    }

    pub fn sub_codes(&self) -> impl Iterator<Item = SubVariable> + '_ {
        self.sub_variables.iter().map(|sub| sub.code)
    }
}

/// Loaded description of the grid. Must cover every identifier exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<VariableDef>", into = "Vec<VariableDef>")]
pub struct Catalog {
    variables: Vec<VariableDef>,
    parents: BTreeMap<SubVariable, Variable>,
}

impl Catalog {
    pub fn new(variables: Vec<VariableDef>) -> Result<Self, CatalogError> {
        let mut seen = BTreeMap::new();
        let mut parents = BTreeMap::new();

        for definition in &variables {
            if seen.insert(definition.code, ()).is_some() {
                return Err(CatalogError::DuplicateVariable(definition.code));
            }
            if definition.sub_variables.is_empty() {
                return Err(CatalogError::EmptyVariable(definition.code));
            }
            for sub in definition.sub_codes() {
                if parents.insert(sub, definition.code).is_some() {
                    return Err(CatalogError::DuplicateSubVariable(sub));
                }
            }
        }

        if let Some(missing) = Variable::ALL.into_iter().find(|v| !seen.contains_key(v)) {
            return Err(CatalogError::MissingVariable(missing));
        }
        if let Some(missing) = SubVariable::ALL
            .into_iter()
            .find(|sub| !parents.contains_key(sub))
        {
            return Err(CatalogError::MissingSubVariable(missing));
        }

        Ok(Self { variables, parents })
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn variable(&self, code: Variable) -> Option<&VariableDef> {
        self.variables.iter().find(|definition| definition.code == code)
    }

    pub fn parent_of(&self, sub: SubVariable) -> Option<Variable> {
        self.parents.get(&sub).copied()
    }

    pub fn discriminants(&self) -> impl Iterator<Item = Variable> + '_ {
        self.variables
            .iter()
            .filter(|definition| definition.is_discriminant())
            .map(|definition| definition.code)
    }

    pub fn sub_variables(&self) -> impl Iterator<Item = SubVariable> + '_ {
        self.variables.iter().flat_map(VariableDef::sub_codes)
    }

    pub fn sub_variable_count(&self) -> usize {
        self.parents.len()
    }

    /// Resolve a client supplied code against the catalog.
    pub fn resolve(&self, code: &str) -> Option<SubVariable> {
        code.parse::<SubVariable>()
            .ok()
            .filter(|sub| self.parents.contains_key(sub))
    }
}

impl TryFrom<Vec<VariableDef>> for Catalog {
    type Error = CatalogError;

    fn try_from(value: Vec<VariableDef>) -> Result<Self, Self::Error> {
        Catalog::new(value)
    }
}

impl From<Catalog> for Vec<VariableDef> {
    fn from(value: Catalog) -> Self {
        value.variables
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("variable {0} is defined more than once")]
    DuplicateVariable(Variable),
    #[error("sub-variable {0} belongs to more than one variable")]
    DuplicateSubVariable(SubVariable),
    #[error("variable {0} declares no sub-variables")]
    EmptyVariable(Variable),
    #[error("catalog is missing variable {0}")]
    MissingVariable(Variable),
    #[error("catalog is missing sub-variable {0}")]
    MissingSubVariable(SubVariable),
}
