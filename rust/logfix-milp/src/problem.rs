//! A fully assembled diagnosis instance.

use crate::assembler::Assembler;
use crate::config::{EncodingConfig, EncodingParams, Magnitudes};
use crate::diagnose::{DiagnoseError, Warning};
use crate::linear::Assignment;
use crate::model::{Model, ModelError};
use crate::objective::{self, ObjectiveConfig};
use crate::provenance::Relation;
use crate::targets::Targets;
use crate::variables::VariableSets;
use logfix_core::{ArithOp, Expression, Literal, Operand, Row, Scenario, Statement};
use tracing::{info, warn};

/// The MILP of one scenario plus everything needed to interpret it.
#[derive(Debug, Clone)]
pub struct Problem {
    pub model: Model,
    pub sets: VariableSets,
    pub relation: Relation,
    pub targets: Targets,
    pub params: EncodingParams,
    pub log: Vec<Statement>,
    pub warnings: Vec<Warning>,
}

impl Problem {
    pub fn build(
        scenario: &Scenario,
        encoding: &EncodingConfig,
        objective: &ObjectiveConfig,
    ) -> Result<Self, DiagnoseError> {
        let schema = scenario.validate()?;
        let mut log = scenario.parsed_log();
        if log.is_empty() {
            return Err(DiagnoseError::EmptyLog);
        }

        let mut warnings = Vec::new();
        for (index, stmt) in log.iter().enumerate() {
            if let Statement::Unknown { raw } = stmt {
                warn!(stmt = index, text = %raw, "statement not understood; treated as a no-op");
                warnings.push(Warning::UnparsedStatement {
                    index,
                    text: raw.clone(),
                });
            }
        }
        // A constant we cannot read as a number has no value to encode, so the
        // statement it belongs to is carried through unchanged.
        for (index, (stmt, raw)) in log.iter_mut().zip(&scenario.log).enumerate() {
            let Some(text) = stmt
                .literals()
                .into_iter()
                .find_map(|(_, lit)| lit.value.is_none().then(|| lit.text.clone()))
            else {
                continue;
            };
            warn!(stmt = index, constant = %text, "non-numeric constant; statement treated as a no-op");
            warnings.push(Warning::NonNumericLiteral { index, text });
            *stmt = Statement::Unknown { raw: raw.clone() };
        }

        let relation = Relation::build(&schema, &scenario.initial, &log);
        let targets = Targets::derive(
            &relation,
            &scenario.final_state,
            &scenario.complaints,
            encoding.anchor_unreported,
        );
        for &(index, key) in &targets.unmatched {
            warn!(complaint = index, key, "complaint matches no tuple; ignored");
            warnings.push(Warning::UnmatchedComplaint { index, key });
        }
        for &key in &targets.orphans {
            warn!(key, "final-state row cannot be produced by the log");
            warnings.push(Warning::OrphanFinalRow { key });
        }

        let params = encoding.resolve(&magnitudes(scenario, &log))?;
        info!(
            domain = params.domain,
            ghost = params.ghost,
            big_m = params.big_m,
            epsilon = params.epsilon,
            "resolved encoding parameters"
        );

        let mut model = Model::new();
        let sets = VariableSets::allocate(&mut model, &relation, &log, &params, encoding)?;
        Assembler::new(&mut model, &sets, &relation, &log, params).assemble(&targets)?;
        objective::install(&mut model, &sets, objective)?;
        model.check_references()?;

        let stats = model.stats();
        info!(
            statements = log.len(),
            tuples = relation.len(),
            binaries = stats.binaries,
            integers = stats.integers,
            continuous = stats.continuous,
            constraints = stats.constraints,
            "assembled model"
        );

        Ok(Self {
            model,
            sets,
            relation,
            targets,
            params,
            log,
            warnings,
        })
    }

    /// Every literal at its logged value.
    pub fn literal_seed(&self) -> Assignment {
        self.sets
            .literals
            .iter()
            .map(|l| (l.key.clone(), l.original))
            .collect()
    }

    /// Derive a complete assignment from the logged literals, with
    /// `overrides` taking precedence.
    pub fn witness(&self, overrides: &Assignment) -> Result<Assignment, ModelError> {
        let mut seed = self.literal_seed();
        seed.extend(overrides.iter().map(|(k, v)| (k.clone(), v)));
        self.model.complete(&seed)
    }
}

/// Magnitudes that size the encoding: every value in the states and
/// complaints, every numeric literal, and the scaling factors of SET
/// expressions, compounded along the log. State values are also measured
/// against the WHERE constants that compare their attribute.
pub fn magnitudes(scenario: &Scenario, log: &[Statement]) -> Magnitudes {
    let mut mags = Magnitudes::default();
    let rows: Vec<&Row> = scenario
        .initial
        .iter()
        .chain(&scenario.final_state)
        .chain(
            scenario
                .complaints
                .iter()
                .flat_map(|c| c.wrong.iter().chain(c.correct.iter())),
        )
        .collect();
    for row in &rows {
        for v in row.values() {
            mags.observe(*v);
        }
    }
    for stmt in log {
        for c in stmt.conditions() {
            let Operand::Literal(Literal { value: Some(t), .. }) = &c.value else {
                continue;
            };
            for v in rows.iter().filter_map(|row| row.get(&c.attribute)) {
                mags.observe_gap(*v, *t);
            }
        }
        for (_, lit) in stmt.literals() {
            if let Some(v) = lit.value {
                mags.observe(v);
            }
        }
        if let Statement::Update { assignments, .. } = stmt {
            // Assignments of one statement all read the pre-statement row, so
            // only their largest factor compounds with later statements.
            let mut widest: f64 = 1.0;
            for a in assignments {
                if let Expression::Binary { left, op, right } = &a.expr {
                    let factor = [left, right]
                        .into_iter()
                        .find_map(|o| match o {
                            Operand::Literal(lit) => lit.value,
                            Operand::Attribute { .. } => None,
                        });
                    let scale = match (op, factor) {
                        (ArithOp::Mul, Some(k)) => k,
                        (ArithOp::Div, Some(k)) if k != 0.0 => 1.0 / k,
                        _ => continue,
                    };
                    mags.observe_coefficient(scale);
                    widest = widest.max(scale.abs());
                }
            }
            mags.observe_growth(widest);
        }
    }
    mags
}
