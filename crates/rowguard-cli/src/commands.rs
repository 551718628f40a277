//! Subcommand definitions and statement rendering.

use clap::{Args as ClapArgs, Subcommand};

use rowguard_core::statement::{
    self, AccountAction, ActivationPredicate, AuditAction, AuditCondition, AuditGranularity,
    AuditPolicySpec, ContextPair, DropBehavior, Grantable, MaskingFunction, ObjectPrivilege,
    PrincipalAlter, PrincipalSpec, ProfileLimit, ProfileLimits, ProfileLimitsUpdate, Quota,
    QuotaClause, RedactionPolicySpec, RoleAuth, Statement, SystemPrivilege,
};
use rowguard_core::{Error, ExecutionMode, Result, ValidatorConfig};

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Principal administration.
    #[command(subcommand)]
    Principal(PrincipalCmd),
    /// Profile administration.
    #[command(subcommand)]
    Profile(ProfileCmd),
    /// Role administration.
    #[command(subcommand)]
    Role(RoleCmd),
    /// Grant a privilege or role.
    Grant(GrantCmd),
    /// Revoke a privilege or role.
    Revoke(RevokeCmd),
    /// Register row-filter context pairs for a caller.
    Bind(BindCmd),
    /// Remove a caller's row-filter binding.
    Unbind {
        /// Caller identity.
        caller: String,
    },
    /// Audit policy administration.
    #[command(subcommand)]
    AuditPolicy(AuditPolicyCmd),
    /// Redaction policy administration.
    #[command(subcommand)]
    Redact(RedactCmd),
}

/// Principal subcommands.
#[derive(Subcommand, Debug)]
pub enum PrincipalCmd {
    /// Render a create statement.
    Create {
        /// Account name.
        name: String,
        /// Initial password.
        #[arg(long)]
        password: String,
        /// Default tablespace.
        #[arg(long)]
        default_tablespace: String,
        /// Temporary tablespace.
        #[arg(long)]
        temporary_tablespace: Option<String>,
        /// Quota in megabytes on the default tablespace.
        #[arg(long, conflicts_with = "quota_unlimited")]
        quota_mb: Option<u32>,
        /// Unlimited quota on the default tablespace.
        #[arg(long)]
        quota_unlimited: bool,
        /// Assigned profile.
        #[arg(long)]
        profile: Option<String>,
    },
    /// Render an alter statement.
    Alter {
        /// Account name.
        name: String,
        /// New password.
        #[arg(long)]
        password: Option<String>,
        /// New default tablespace.
        #[arg(long)]
        default_tablespace: Option<String>,
        /// New temporary tablespace.
        #[arg(long)]
        temporary_tablespace: Option<String>,
        /// New quota in megabytes, applied to the named tablespace.
        #[arg(long, requires = "quota_tablespace")]
        quota_mb: Option<u32>,
        /// Tablespace the quota applies to.
        #[arg(long)]
        quota_tablespace: Option<String>,
        /// New profile.
        #[arg(long)]
        profile: Option<String>,
    },
    /// Render an account lock statement.
    Lock {
        /// Account name.
        name: String,
    },
    /// Render an account unlock statement.
    Unlock {
        /// Account name.
        name: String,
    },
    /// Render a password-expiry statement.
    Expire {
        /// Account name.
        name: String,
    },
    /// Render a drop statement.
    Drop {
        /// Account name.
        name: String,
        /// Drop owned objects too.
        #[arg(long)]
        cascade: bool,
    },
}

/// Shared profile limit options.
#[derive(ClapArgs, Debug)]
pub struct LimitArgs {
    /// Concurrent session ceiling (DEFAULT, UNLIMITED, or a number).
    #[arg(long)]
    pub sessions_per_user: Option<ProfileLimit>,
    /// Connect time ceiling in minutes.
    #[arg(long)]
    pub connect_time: Option<ProfileLimit>,
    /// Idle time ceiling in minutes.
    #[arg(long)]
    pub idle_time: Option<ProfileLimit>,
    /// Failed login attempts before the account locks.
    #[arg(long)]
    pub failed_login_attempts: Option<ProfileLimit>,
    /// Password lifetime in days.
    #[arg(long)]
    pub password_life_time: Option<ProfileLimit>,
}

/// Profile subcommands.
#[derive(Subcommand, Debug)]
pub enum ProfileCmd {
    /// Render a create statement.
    Create {
        /// Profile name.
        name: String,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Render an alter statement.
    Alter {
        /// Profile name.
        name: String,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Render a drop statement.
    Drop {
        /// Profile name.
        name: String,
        /// Reassign dependents instead of rejecting.
        #[arg(long)]
        cascade: bool,
    },
}

/// Role subcommands.
#[derive(Subcommand, Debug)]
pub enum RoleCmd {
    /// Render a create statement.
    Create {
        /// Role name.
        name: String,
        /// Password required to enable the role.
        #[arg(long)]
        password: Option<String>,
    },
    /// Render an alter statement for the role's authentication.
    Alter {
        /// Role name.
        name: String,
        /// New password; omit to remove the password requirement.
        #[arg(long)]
        password: Option<String>,
    },
    /// Render a drop statement.
    Drop {
        /// Role name.
        name: String,
    },
}

/// Grant options.
#[derive(ClapArgs, Debug)]
pub struct GrantCmd {
    /// Privilege ("CREATE SESSION", "SELECT") or role name.
    pub target: String,
    /// Grantee.
    #[arg(long)]
    pub to: String,
    /// Target object for object privileges.
    #[arg(long)]
    pub on: Option<String>,
    /// Grant with admin option.
    #[arg(long)]
    pub admin_option: bool,
}

/// Revoke options.
#[derive(ClapArgs, Debug)]
pub struct RevokeCmd {
    /// Privilege ("CREATE SESSION", "SELECT") or role name.
    pub target: String,
    /// Grantee.
    #[arg(long)]
    pub from: String,
    /// Target object for object privileges.
    #[arg(long)]
    pub on: Option<String>,
}

/// Binding options.
#[derive(ClapArgs, Debug)]
pub struct BindCmd {
    /// Caller identity.
    pub caller: String,
    /// Context pair as KEY=VALUE; repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
    pub pairs: Vec<String>,
}

/// Audit policy subcommands.
#[derive(Subcommand, Debug)]
pub enum AuditPolicyCmd {
    /// Render a create statement or registration call.
    Create {
        /// Policy name.
        name: String,
        /// Object whose statements are captured.
        #[arg(long)]
        on: String,
        /// Captured statement kinds; repeatable, defaults to ALL.
        #[arg(long = "action")]
        actions: Vec<AuditAction>,
        /// Register as a fine-grained policy.
        #[arg(long)]
        fine: bool,
        /// Audited column (fine-grained only).
        #[arg(long, requires = "fine")]
        column: Option<String>,
        /// Capture when this context KEY=VALUE holds (fine-grained only).
        #[arg(long, value_name = "KEY=VALUE", requires = "fine")]
        when_context: Option<String>,
    },
    /// Render an enable statement.
    Enable {
        /// Policy name.
        name: String,
    },
    /// Render a disable statement.
    Disable {
        /// Policy name.
        name: String,
    },
    /// Render a drop statement or removal call.
    Drop {
        /// Policy name.
        name: String,
        /// The policy is fine-grained.
        #[arg(long)]
        fine: bool,
    },
}

/// Redaction subcommands.
#[derive(Subcommand, Debug)]
pub enum RedactCmd {
    /// Render a registration call.
    Add {
        /// Policy name.
        name: String,
        /// Object the masked column belongs to.
        #[arg(long)]
        on: String,
        /// Masked column.
        #[arg(long)]
        column: String,
        /// Masking function: full, partial, nullify, or random.
        #[arg(long, default_value = "full")]
        function: String,
        /// Visible prefix length for partial masking.
        #[arg(long, default_value_t = 0)]
        prefix_visible: u32,
        /// Visible suffix length for partial masking.
        #[arg(long, default_value_t = 0)]
        suffix_visible: u32,
        /// Activate only when this context KEY=VALUE holds.
        #[arg(long, value_name = "KEY=VALUE")]
        when_context: Option<String>,
    },
    /// Render a removal call.
    Drop {
        /// Policy name.
        name: String,
        /// Object the policy is attached to.
        #[arg(long)]
        on: String,
    },
}

/// Validate inputs, render statements, and print them.
pub fn run(args: &crate::Args) -> Result<()> {
    let validator =
        ValidatorConfig::default().with_max_identifier_len(args.max_identifier_len);
    let statements = render(&validator, &args.command)?;
    for stmt in &statements {
        print_statement(stmt, args.json)?;
    }
    tracing::debug!(count = statements.len(), "statements rendered");
    Ok(())
}

fn print_statement(stmt: &Statement, json: bool) -> Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(stmt)
            .map_err(|e| Error::InvalidLiteral(e.to_string()))?;
        println!("{}", rendered);
        return Ok(());
    }
    let mode = match stmt.mode() {
        ExecutionMode::Ddl => "ddl",
        ExecutionMode::Dml => "dml",
    };
    println!("-- channel: {}", mode);
    println!("{}", stmt.text());
    for (i, param) in stmt.params().iter().enumerate() {
        println!("--   :{} = {}", i + 1, param);
    }
    Ok(())
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .ok_or_else(|| Error::InvalidLiteral(format!("expected KEY=VALUE, got '{}'", raw)))
}

fn parse_grant_target(
    validator: &ValidatorConfig,
    target: &str,
    on: Option<&str>,
) -> Result<Grantable> {
    if let Some(object) = on {
        let privilege: ObjectPrivilege = target
            .parse()
            .map_err(Error::InvalidIdentifier)?;
        return Ok(Grantable::Object {
            privilege,
            object: validator.validate_identifier(object)?,
        });
    }
    if let Ok(privilege) = target.parse::<SystemPrivilege>() {
        return Ok(Grantable::System(privilege));
    }
    Ok(Grantable::Role(validator.validate_identifier(target)?))
}

fn render(validator: &ValidatorConfig, command: &Command) -> Result<Vec<Statement>> {
    let v = validator;
    let stmts = match command {
        Command::Principal(cmd) => match cmd {
            PrincipalCmd::Create {
                name,
                password,
                default_tablespace,
                temporary_tablespace,
                quota_mb,
                quota_unlimited,
                profile,
            } => {
                let quota = if *quota_unlimited {
                    Some(Quota::Unlimited)
                } else {
                    quota_mb.map(Quota::Megabytes)
                };
                vec![statement::create_principal(&PrincipalSpec {
                    name: v.validate_identifier(name)?,
                    password: v.validate_secret_literal(password)?,
                    default_tablespace: v.validate_identifier(default_tablespace)?,
                    temporary_tablespace: temporary_tablespace
                        .as_deref()
                        .map(|t| v.validate_identifier(t))
                        .transpose()?,
                    quota,
                    profile: profile
                        .as_deref()
                        .map(|p| v.validate_identifier(p))
                        .transpose()?,
                })]
            }
            PrincipalCmd::Alter {
                name,
                password,
                default_tablespace,
                temporary_tablespace,
                quota_mb,
                quota_tablespace,
                profile,
            } => {
                let quota = match (quota_mb, quota_tablespace) {
                    (Some(mb), Some(ts)) => Some(QuotaClause {
                        quota: Quota::Megabytes(*mb),
                        tablespace: v.validate_identifier(ts)?,
                    }),
                    _ => None,
                };
                let alter = PrincipalAlter {
                    password: password
                        .as_deref()
                        .map(|p| v.validate_secret_literal(p))
                        .transpose()?,
                    default_tablespace: default_tablespace
                        .as_deref()
                        .map(|t| v.validate_identifier(t))
                        .transpose()?,
                    temporary_tablespace: temporary_tablespace
                        .as_deref()
                        .map(|t| v.validate_identifier(t))
                        .transpose()?,
                    quota,
                    profile: profile
                        .as_deref()
                        .map(|p| v.validate_identifier(p))
                        .transpose()?,
                };
                statement::alter_principal(&v.validate_identifier(name)?, &alter)
                    .into_iter()
                    .collect()
            }
            PrincipalCmd::Lock { name } => vec![statement::account_action(
                &v.validate_identifier(name)?,
                AccountAction::Lock,
            )],
            PrincipalCmd::Unlock { name } => vec![statement::account_action(
                &v.validate_identifier(name)?,
                AccountAction::Unlock,
            )],
            PrincipalCmd::Expire { name } => {
                vec![statement::expire_password(&v.validate_identifier(name)?)]
            }
            PrincipalCmd::Drop { name, cascade } => vec![statement::drop_principal(
                &v.validate_identifier(name)?,
                drop_behavior(*cascade),
            )],
        },
        Command::Profile(cmd) => match cmd {
            ProfileCmd::Create { name, limits } => {
                let bundle = ProfileLimits {
                    sessions_per_user: limits.sessions_per_user.unwrap_or_default(),
                    connect_time: limits.connect_time.unwrap_or_default(),
                    idle_time: limits.idle_time.unwrap_or_default(),
                    failed_login_attempts: limits.failed_login_attempts.unwrap_or_default(),
                    password_life_time: limits.password_life_time.unwrap_or_default(),
                };
                vec![statement::create_profile(&v.validate_identifier(name)?, &bundle)]
            }
            ProfileCmd::Alter { name, limits } => {
                let update = ProfileLimitsUpdate {
                    sessions_per_user: limits.sessions_per_user,
                    connect_time: limits.connect_time,
                    idle_time: limits.idle_time,
                    failed_login_attempts: limits.failed_login_attempts,
                    password_life_time: limits.password_life_time,
                };
                statement::alter_profile(&v.validate_identifier(name)?, &update)
                    .into_iter()
                    .collect()
            }
            ProfileCmd::Drop { name, cascade } => vec![statement::drop_profile(
                &v.validate_identifier(name)?,
                drop_behavior(*cascade),
            )],
        },
        Command::Role(cmd) => match cmd {
            RoleCmd::Create { name, password } => {
                let auth = role_auth(v, password.as_deref())?;
                vec![statement::create_role(&v.validate_identifier(name)?, &auth)]
            }
            RoleCmd::Alter { name, password } => {
                let auth = role_auth(v, password.as_deref())?;
                vec![statement::alter_role(&v.validate_identifier(name)?, &auth)]
            }
            RoleCmd::Drop { name } => vec![statement::drop_role(&v.validate_identifier(name)?)],
        },
        Command::Grant(cmd) => {
            let grantable = parse_grant_target(v, &cmd.target, cmd.on.as_deref())?;
            vec![statement::grant(
                &grantable,
                &v.validate_identifier(&cmd.to)?,
                cmd.admin_option,
            )]
        }
        Command::Revoke(cmd) => {
            let grantable = parse_grant_target(v, &cmd.target, cmd.on.as_deref())?;
            vec![statement::revoke(
                &grantable,
                &v.validate_identifier(&cmd.from)?,
            )]
        }
        Command::Bind(cmd) => {
            let caller = v.validate_identifier(&cmd.caller)?;
            let mut stmts = Vec::with_capacity(cmd.pairs.len());
            for raw in &cmd.pairs {
                let (key, value) = split_pair(raw)?;
                stmts.push(statement::bind_row_filter_pair(
                    &caller,
                    &ContextPair {
                        key: v.validate_identifier(key)?,
                        value: value.to_string(),
                    },
                ));
            }
            stmts
        }
        Command::Unbind { caller } => {
            vec![statement::unbind_row_filter(&v.validate_identifier(caller)?)]
        }
        Command::AuditPolicy(cmd) => match cmd {
            AuditPolicyCmd::Create {
                name,
                on,
                actions,
                fine,
                column,
                when_context,
            } => {
                let condition = when_context
                    .as_deref()
                    .map(|raw| {
                        let (key, value) = split_pair(raw)?;
                        Ok::<_, Error>(AuditCondition::ContextEquals {
                            key: v.validate_identifier(key)?,
                            value: v.validate_identifier(value)?,
                        })
                    })
                    .transpose()?;
                vec![statement::create_audit_policy(&AuditPolicySpec {
                    name: v.validate_identifier(name)?,
                    object: v.validate_identifier(on)?,
                    actions: actions.clone(),
                    column: column
                        .as_deref()
                        .map(|c| v.validate_identifier(c))
                        .transpose()?,
                    condition,
                    granularity: granularity(*fine),
                })]
            }
            AuditPolicyCmd::Enable { name } => vec![statement::set_audit_policy_enabled(
                &v.validate_identifier(name)?,
                true,
            )],
            AuditPolicyCmd::Disable { name } => vec![statement::set_audit_policy_enabled(
                &v.validate_identifier(name)?,
                false,
            )],
            AuditPolicyCmd::Drop { name, fine } => vec![statement::drop_audit_policy(
                &v.validate_identifier(name)?,
                granularity(*fine),
            )],
        },
        Command::Redact(cmd) => match cmd {
            RedactCmd::Add {
                name,
                on,
                column,
                function,
                prefix_visible,
                suffix_visible,
                when_context,
            } => {
                let function = masking_function(function, *prefix_visible, *suffix_visible)?;
                let predicate = match when_context.as_deref() {
                    Some(raw) => {
                        let (key, value) = split_pair(raw)?;
                        ActivationPredicate::ContextEquals {
                            key: v.validate_identifier(key)?,
                            value: v.validate_identifier(value)?,
                        }
                    }
                    None => ActivationPredicate::Always,
                };
                vec![statement::add_redaction_policy(&RedactionPolicySpec {
                    name: v.validate_identifier(name)?,
                    object: v.validate_identifier(on)?,
                    column: v.validate_identifier(column)?,
                    function,
                    predicate,
                })]
            }
            RedactCmd::Drop { name, on } => vec![statement::drop_redaction_policy(
                &v.validate_identifier(name)?,
                &v.validate_identifier(on)?,
            )],
        },
    };
    Ok(stmts)
}

fn drop_behavior(cascade: bool) -> DropBehavior {
    if cascade {
        DropBehavior::Cascade
    } else {
        DropBehavior::Restrict
    }
}

fn granularity(fine: bool) -> AuditGranularity {
    if fine {
        AuditGranularity::Fine
    } else {
        AuditGranularity::Coarse
    }
}

fn role_auth(v: &ValidatorConfig, password: Option<&str>) -> Result<RoleAuth> {
    Ok(match password {
        Some(pw) => RoleAuth::Password(v.validate_secret_literal(pw)?),
        None => RoleAuth::NotIdentified,
    })
}

fn masking_function(name: &str, prefix_visible: u32, suffix_visible: u32) -> Result<MaskingFunction> {
    match name.to_ascii_lowercase().as_str() {
        "full" => Ok(MaskingFunction::Full),
        "partial" => Ok(MaskingFunction::Partial {
            prefix_visible,
            suffix_visible,
            mask_char: '*',
        }),
        "nullify" => Ok(MaskingFunction::Nullify),
        "random" => Ok(MaskingFunction::Random),
        other => Err(Error::InvalidLiteral(format!(
            "unknown masking function '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ValidatorConfig {
        ValidatorConfig::default()
    }

    #[test]
    fn test_grant_target_parsing() {
        let v = validator();
        assert!(matches!(
            parse_grant_target(&v, "CREATE SESSION", None).unwrap(),
            Grantable::System(SystemPrivilege::CreateSession)
        ));
        assert!(matches!(
            parse_grant_target(&v, "select", Some("projects")).unwrap(),
            Grantable::Object { .. }
        ));
        assert!(matches!(
            parse_grant_target(&v, "hr_role", None).unwrap(),
            Grantable::Role(_)
        ));
        assert!(parse_grant_target(&v, "hr; drop", None).is_err());
    }

    #[test]
    fn test_render_principal_create() {
        let v = validator();
        let stmts = render(
            &v,
            &Command::Principal(PrincipalCmd::Create {
                name: "app1".to_string(),
                password: "pw123456".to_string(),
                default_tablespace: "users".to_string(),
                temporary_tablespace: None,
                quota_mb: Some(25),
                quota_unlimited: false,
                profile: None,
            }),
        )
        .unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].text().starts_with("CREATE USER APP1"));
        assert!(stmts[0].text().contains("QUOTA 25M ON USERS"));
    }

    #[test]
    fn test_render_bind_pairs() {
        let v = validator();
        let stmts = render(
            &v,
            &Command::Bind(BindCmd {
                caller: "hr_user".to_string(),
                pairs: vec!["dept=HR".to_string(), "region=WEST".to_string()],
            }),
        )
        .unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].mode(), ExecutionMode::Dml);
    }

    #[test]
    fn test_invalid_pair_is_rejected() {
        let v = validator();
        let err = render(
            &v,
            &Command::Bind(BindCmd {
                caller: "hr_user".to_string(),
                pairs: vec!["no-equals".to_string()],
            }),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidLiteral(_)));
    }

    #[test]
    fn test_empty_alter_renders_nothing() {
        let v = validator();
        let stmts = render(
            &v,
            &Command::Principal(PrincipalCmd::Alter {
                name: "app1".to_string(),
                password: None,
                default_tablespace: None,
                temporary_tablespace: None,
                quota_mb: None,
                quota_tablespace: None,
                profile: None,
            }),
        )
        .unwrap();
        assert!(stmts.is_empty());
    }
}
