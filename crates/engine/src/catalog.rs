//! The hardcoded step catalog.
//!
//! Every release that changed the stored shape of the settings contributes
//! one step here. Each step checks whether its change is already in place
//! before writing, since a replayed run may meet a store that a previous
//! (possibly partial) run already migrated.

use crate::context::MigrationContext;
use crate::diagnostics::Severity;
use crate::keys::{self, legacy};
use crate::remap::{self, localize, FieldMapping, GroupMapping, OptionSet, RemapTable, DEFAULT_LOCALE};
use crate::steps::{Direction, MigrationStep, StepOutcome, StepRegistry, StepResult, Threshold};
use crate::traits::StoreError;
use crate::values::{into_map, is_empty, is_filled, load_option, modify_option, text, to_int, OptionMap};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Build the registry of every known step.
pub fn standard_registry() -> StepRegistry {
    let mut reg = StepRegistry::new();
    reg.register(MigrationStep::new(
        "prepare-resources",
        Threshold::Prologue,
        Direction::Both,
        prepare_resources,
    ))
    .register(MigrationStep::new(
        "clear-fonts-flag",
        Threshold::Prologue,
        Direction::UpgradeOnly,
        clear_fonts_flag,
    ))
    .register(MigrationStep::new(
        "seed-defaults",
        Threshold::Prologue,
        Direction::InstallOnly,
        seed_defaults,
    ))
    .register(MigrationStep::new(
        "resync-resources",
        Threshold::Prologue,
        Direction::DowngradeOnly,
        resync_resources,
    ))
    .register(MigrationStep::upgrade("copy-next-invoice-number", "1.5.28", copy_next_invoice_number))
    .register(MigrationStep::upgrade("reshape-settings", "2.0-dev", reshape_settings))
    .register(MigrationStep::upgrade("seed-invoice-counter", "2.0-beta-2", seed_invoice_counter))
    .register(MigrationStep::upgrade("cleanup-defaults", "2.1.9", cleanup_defaults))
    .register(MigrationStep::upgrade("remove-obsolete-font-files", "2.11.2", remove_obsolete_font_files))
    .register(MigrationStep::upgrade("migrate-template-paths", "2.11.5", migrate_template_paths))
    .register(MigrationStep::upgrade("number-date-defaults", "2.12.2-dev-1", number_date_defaults))
    .register(MigrationStep::upgrade("drop-html5-parser", "3.0.0-dev-1", drop_html5_parser))
    .register(MigrationStep::upgrade("schedule-yearly-reset", "3.3.0-dev-1", schedule_yearly_reset))
    .register(MigrationStep::upgrade("document-link-access-type", "3.5.7-dev-1", document_link_access_type))
    .register(MigrationStep::upgrade("drop-legacy-mode", "3.6.3-dev-1", drop_legacy_mode))
    .register(MigrationStep::upgrade("migrate-ubl-settings", "3.7.0-beta-4", migrate_ubl_settings))
    .register(MigrationStep::upgrade("uppercase-ubl-tax-codes", "3.9.5-beta-4", uppercase_ubl_tax_codes))
    .register(MigrationStep::upgrade("unlocalize-tax-ids", "4.0.0-beta-3", unlocalize_tax_ids))
    .register(MigrationStep::upgrade("guest-access-to-full", "4.2.0-beta.3", guest_access_to_full))
    .register(MigrationStep::upgrade(
        "reload-attachment-translations",
        "4.3.0-rc.2",
        reload_attachment_translations,
    ))
    .register(MigrationStep::upgrade("filesystem-method-php", "4.5.0-beta.2", filesystem_method_php))
    .register(MigrationStep::upgrade("shop-address-additional", "4.5.0-beta.3", shop_address_additional))
    .register(MigrationStep::upgrade("shop-state-codes", "4.5.3-pr1195.1", shop_state_codes))
    .register(MigrationStep::new(
        "reinstall-fonts",
        Threshold::Epilogue,
        Direction::UpgradeOnly,
        reinstall_fonts,
    ));
    reg
}

fn outcome(changed: bool, reason: &str) -> StepOutcome {
    if changed {
        StepOutcome::Applied
    } else {
        StepOutcome::skipped(reason)
    }
}

/// Missing working folders are reported as critical and the step is
/// skipped; any other collaborator failure is a step error.
fn skip_if_unavailable(ctx: &MigrationContext, what: &str, err: StoreError) -> StepResult<StepOutcome> {
    match err {
        StoreError::ResourceUnavailable(_) => {
            ctx.logger().log(what, Severity::Critical, Some(&err));
            Ok(StepOutcome::skipped(err.to_string()))
        }
        other => Err(other.into()),
    }
}

// ---------------------------------------------------------------------------
// Working folders and fonts
// ---------------------------------------------------------------------------

fn prepare_resources(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let resources = ctx.resources();
    if resources.is_ready() {
        return Ok(StepOutcome::skipped("working folders ready"));
    }
    match resources.init_tmp() {
        Ok(()) => Ok(StepOutcome::Applied),
        Err(e) => skip_if_unavailable(ctx, "Could not initialize the working folders", e),
    }
}

fn clear_fonts_flag(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    match ctx.resources().clear_fonts_flag() {
        Ok(()) => Ok(StepOutcome::Applied),
        Err(e) => skip_if_unavailable(ctx, "Could not reset the fonts flag", e),
    }
}

fn resync_resources(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let resources = ctx.resources();
    if resources.tmp_base().is_none() {
        return Ok(StepOutcome::skipped("no working folder"));
    }
    if !resources.is_ready() {
        if let Err(e) = resources.init_tmp() {
            return skip_if_unavailable(ctx, "Could not initialize the working folders", e);
        }
    }
    resources.clear_fonts_flag()?;
    match resources.reinstall_fonts(false) {
        Ok(()) => Ok(StepOutcome::Applied),
        Err(e) => skip_if_unavailable(ctx, "Could not reinstall fonts", e),
    }
}

fn reinstall_fonts(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let resources = ctx.resources();
    if resources.fonts_path().is_none() {
        return Ok(StepOutcome::skipped("no fonts folder"));
    }
    match resources.reinstall_fonts(true) {
        Ok(()) => Ok(StepOutcome::Applied),
        Err(e) => skip_if_unavailable(ctx, "Could not reinstall fonts", e),
    }
}

// ---------------------------------------------------------------------------
// Install
// ---------------------------------------------------------------------------

/// Currencies whose symbols the bundled default font cannot render.
const UNSUPPORTED_CURRENCY_SYMBOLS: &[&str] = &[
    "AED", "AFN", "BDT", "BHD", "BTC", "CRC", "DZD", "GEL", "GHS", "ILS", "INR", "IQD", "IRR",
    "IRT", "JOD", "KHR", "KPW", "KRW", "KWD", "LAK", "LBP", "LKR", "LYD", "MAD", "MNT", "MUR",
    "MVR", "NPR", "OMR", "PHP", "PKR", "PYG", "QAR", "RUB", "SAR", "SCR", "SDG", "SYP", "THB",
    "TND", "TRY", "UAH", "YER",
];

fn seed_defaults(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let hooks = ctx.hooks();
    let currency_font = match hooks.shop_currency() {
        Some(c) if UNSUPPORTED_CURRENCY_SYMBOLS.contains(&c.to_uppercase().as_str()) => json!(1),
        _ => json!(""),
    };
    let template_path = format!("{}/templates/Simple", hooks.plugin_path().trim_end_matches('/'));

    let defaults = [
        (
            keys::GENERAL,
            json!({
                "download_display": "display",
                "template_path": template_path,
                "currency_font": currency_font,
                "paper_size": "a4",
            }),
        ),
        (keys::INVOICE, json!({ "enabled": 1 })),
        (keys::PACKING_SLIP, json!({ "enabled": 1 })),
        (keys::DEBUG, json!({ "enable_cleanup": 1, "cleanup_days": 7 })),
    ];

    let mut added = Vec::new();
    for (name, value) in defaults {
        if ctx.settings().add(name, value)? {
            added.push(name);
        }
    }
    if !added.is_empty() {
        tracing::info!(options = ?added, "seeded default settings");
        hooks.notify_new_install()?;
    }
    hooks.schedule_yearly_reset_numbers()?;
    Ok(outcome(!added.is_empty(), "defaults already present"))
}

// ---------------------------------------------------------------------------
// 1.x / 2.x: legacy layout
// ---------------------------------------------------------------------------

fn copy_next_invoice_number(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let settings = ctx.settings();
    if settings.get(keys::NEXT_INVOICE_NUMBER)?.is_some() {
        return Ok(StepOutcome::skipped("next invoice number already copied"));
    }
    let template = load_option(settings, legacy::TEMPLATE)?;
    match template.get("next_invoice_number") {
        Some(next) if !next.is_null() => {
            settings.set(keys::NEXT_INVOICE_NUMBER, next.clone())?;
            Ok(StepOutcome::Applied)
        }
        _ => Ok(StepOutcome::skipped("no legacy next invoice number")),
    }
}

const fn field(key: &'static str, from_option: &'static str, from_key: &'static str) -> FieldMapping {
    FieldMapping {
        key,
        from_option,
        from_key,
    }
}

const GENERAL_FIELDS: &[FieldMapping] = &[
    field("download_display", legacy::GENERAL, "download_display"),
    field("template_path", legacy::TEMPLATE, "template_path"),
    field("currency_font", legacy::TEMPLATE, "currency_font"),
    field("paper_size", legacy::TEMPLATE, "paper_size"),
    field("header_logo", legacy::TEMPLATE, "header_logo"),
    field("shop_name", legacy::TEMPLATE, "shop_name"),
    field("shop_address", legacy::TEMPLATE, "shop_address"),
    field("footer", legacy::TEMPLATE, "footer"),
    field("extra_1", legacy::TEMPLATE, "extra_1"),
    field("extra_2", legacy::TEMPLATE, "extra_2"),
    field("extra_3", legacy::TEMPLATE, "extra_3"),
];

const INVOICE_FIELDS: &[FieldMapping] = &[
    field("attach_to_email_ids", legacy::GENERAL, "email_pdf"),
    field("display_shipping_address", legacy::TEMPLATE, "invoice_shipping_address"),
    field("display_email", legacy::TEMPLATE, "invoice_email"),
    field("display_phone", legacy::TEMPLATE, "invoice_phone"),
    field("display_date", legacy::TEMPLATE, "display_date"),
    field("display_number", legacy::TEMPLATE, "display_number"),
    field("number_format", legacy::TEMPLATE, "invoice_number_formatting"),
    field("reset_number_yearly", legacy::TEMPLATE, "yearly_reset_invoice_number"),
    field("my_account_buttons", legacy::GENERAL, "my_account_buttons"),
    field("invoice_number_column", legacy::GENERAL, "invoice_number_column"),
    field("invoice_date_column", legacy::GENERAL, "invoice_date_column"),
    field("disable_free", legacy::GENERAL, "disable_free"),
];

const PACKING_SLIP_FIELDS: &[FieldMapping] = &[
    field("display_billing_address", legacy::TEMPLATE, "packing_slip_billing_address"),
    field("display_email", legacy::TEMPLATE, "packing_slip_email"),
    field("display_phone", legacy::TEMPLATE, "packing_slip_phone"),
];

const DEBUG_FIELDS: &[FieldMapping] = &[
    field("enable_debug", legacy::DEBUG, "enable_debug"),
    field("html_output", legacy::DEBUG, "html_output"),
];

/// Legacy combined options → grouped options.
pub const RESHAPE: RemapTable = RemapTable {
    groups: &[
        GroupMapping {
            option: keys::GENERAL,
            fields: GENERAL_FIELDS,
            force_enabled: false,
            superseded: &[("shop_address", "shop_address_additional")],
        },
        GroupMapping {
            option: keys::INVOICE,
            fields: INVOICE_FIELDS,
            force_enabled: true,
            superseded: &[],
        },
        GroupMapping {
            option: keys::PACKING_SLIP,
            fields: PACKING_SLIP_FIELDS,
            force_enabled: true,
            superseded: &[],
        },
        GroupMapping {
            option: keys::DEBUG,
            fields: DEBUG_FIELDS,
            force_enabled: false,
            superseded: &[],
        },
    ],
    localizable: &[
        "header_logo",
        "shop_name",
        "shop_address",
        "footer",
        "extra_1",
        "extra_2",
        "extra_3",
    ],
};

/// Forward slashes, host root stripped, `templates/pdf/` folded into
/// `templates/`.
fn normalize_template_path(path: &str, abspath: Option<&str>) -> String {
    let mut path = path.replace('\\', "/");
    if let Some(root) = abspath.map(|a| a.replace('\\', "/")).filter(|a| !a.is_empty()) {
        path = path.replace(&root, "");
    }
    path.replace("/templates/pdf/", "/templates/")
}

/// Bring legacy values into the shape the grouped options expect before
/// they are remapped.
fn normalize_legacy(old: &mut OptionSet, abspath: Option<&str>) {
    if let Some(template) = old.get_mut(legacy::TEMPLATE) {
        let mut formatting = OptionMap::new();
        for part in ["padding", "suffix", "prefix"] {
            if let Some(v) = template.get(&format!("invoice_number_formatting_{}", part)) {
                if !v.is_null() {
                    formatting.insert(part.to_string(), v.clone());
                }
            }
        }
        template.insert("invoice_number_formatting".to_string(), Value::Object(formatting));

        if let Some(path) = template.get("template_path").filter(|v| !is_empty(v)).map(text) {
            template.insert(
                "template_path".to_string(),
                Value::String(normalize_template_path(&path, abspath)),
            );
        }
    }

    if let Some(Value::Object(email_pdf)) = old
        .get_mut(legacy::GENERAL)
        .and_then(|general| general.get_mut("email_pdf"))
    {
        for id in ["completed", "processing"] {
            if let Some(v) = email_pdf.remove(id) {
                email_pdf.insert(format!("customer_{}_order", id), v);
            }
        }
    }
}

fn reshape_settings(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let settings = ctx.settings();
    let mut old = OptionSet::new();
    for name in [legacy::GENERAL, legacy::TEMPLATE, legacy::DEBUG] {
        old.insert(name.to_string(), load_option(settings, name)?);
    }
    normalize_legacy(&mut old, ctx.hooks().abspath().as_deref());

    let written = remap::apply(settings, &old, &RESHAPE)?;
    if !written.is_empty() {
        tracing::info!(groups = ?written, "legacy settings reshaped");
    }
    Ok(outcome(!written.is_empty(), "settings already reshaped"))
}

fn seed_invoice_counter(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let Some(next) = ctx
        .settings()
        .get(keys::NEXT_INVOICE_NUMBER)?
        .filter(|v| !is_empty(v))
    else {
        return Ok(StepOutcome::skipped("no next invoice number"));
    };
    if ctx.numbers().exists(keys::INVOICE_COUNTER)? {
        return Ok(StepOutcome::skipped("invoice counter already exists"));
    }
    // a value without a leading integer seeds 0, as the legacy option did
    let next = to_int(&next).unwrap_or_else(|| {
        tracing::warn!(value = %next, "next invoice number is not a number, seeding 0");
        0
    });
    ctx.numbers().set_next(keys::INVOICE_COUNTER, next)?;
    Ok(StepOutcome::Applied)
}

fn cleanup_defaults(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = modify_option(ctx.settings(), keys::DEBUG, |debug| {
        debug.entry("enable_cleanup").or_insert_with(|| json!(1));
        debug.entry("cleanup_days").or_insert_with(|| json!(7));
        Ok(())
    })?;
    Ok(outcome(changed, "cleanup already configured"))
}

const OBSOLETE_FONT_FILES: &[&str] = &["dompdf_font_family_cache.dist.php", "mustRead.html"];

fn remove_obsolete_font_files(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let Some(fonts) = ctx.resources().fonts_path() else {
        return Ok(StepOutcome::skipped("no fonts folder"));
    };
    for file in OBSOLETE_FONT_FILES {
        if let Err(e) = ctx.resources().remove_file(&fonts.join(file)) {
            return skip_if_unavailable(ctx, "Could not remove obsolete font files", e);
        }
    }
    Ok(StepOutcome::Applied)
}

fn migrate_template_paths(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    ctx.hooks().migrate_template_paths()?;
    Ok(StepOutcome::Applied)
}

pub const NUMBER_DATE_DEFAULT: &str = "1000-01-01 00:00:00";

/// Failures are logged per counter and do not fail the step.
fn number_date_defaults(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let numbers = ctx.numbers();
    let mut changed = false;
    for slug in ctx.hooks().document_slugs() {
        let counter = format!("{}_number", slug);
        if !numbers.exists(&counter)? {
            continue;
        }
        if numbers.date_default(&counter)?.as_deref() == Some(NUMBER_DATE_DEFAULT) {
            continue;
        }
        match numbers.set_date_default(&counter, NUMBER_DATE_DEFAULT) {
            Ok(()) => {
                ctx.logger().log(
                    &format!(
                        "Default value changed for 'date' column to '{}' on number store: {}",
                        NUMBER_DATE_DEFAULT, counter
                    ),
                    Severity::Info,
                    None,
                );
                changed = true;
            }
            Err(e) => ctx.logger().log(
                &format!(
                    "The default value for 'date' column couldn't be changed to '{}' on number store: {}",
                    NUMBER_DATE_DEFAULT, counter
                ),
                Severity::Critical,
                Some(&e),
            ),
        }
    }
    Ok(outcome(changed, "date defaults already set"))
}

// ---------------------------------------------------------------------------
// 3.x
// ---------------------------------------------------------------------------

/// Remove `keys` from the debug settings where they are set.
fn drop_debug_flags(ctx: &MigrationContext, flags: &[&str]) -> StepResult<bool> {
    modify_option(ctx.settings(), keys::DEBUG, |debug| {
        for flag in flags {
            if is_filled(debug.get(*flag)) {
                debug.remove(*flag);
            }
        }
        Ok(())
    })
}

fn drop_html5_parser(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = drop_debug_flags(ctx, &["use_html5_parser"])?;
    Ok(outcome(changed, "html5 parser flag not set"))
}

fn schedule_yearly_reset(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    ctx.hooks().schedule_yearly_reset_numbers()?;
    Ok(StepOutcome::Applied)
}

fn document_link_access_type(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = modify_option(ctx.settings(), keys::DEBUG, |debug| {
        if is_filled(debug.get("guest_access")) {
            debug.remove("guest_access");
            debug.insert("document_link_access_type".to_string(), json!("guest"));
        }
        Ok(())
    })?;
    Ok(outcome(changed, "guest access not set"))
}

fn drop_legacy_mode(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = drop_debug_flags(ctx, &["legacy_mode", "legacy_textdomain"])?;
    Ok(outcome(changed, "legacy mode not set"))
}

const UBL_INVOICE_KEYS: &[&str] = &["attach_to_email_ids", "include_encrypted_pdf"];

fn migrate_ubl_settings(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let settings = ctx.settings();
    let ubl = load_option(settings, legacy::UBL_GENERAL)?;
    let present = |key: &str| ubl.get(key).filter(|v| !v.is_null()).cloned();

    let mut changed = modify_option(settings, keys::GENERAL, |general| {
        for key in ["vat_number", "coc_number"] {
            if let Some(v) = present(key) {
                general.entry(key).or_insert(v);
            }
        }
        // the legacy company name becomes the shop name, unless one is set
        if let Some(name) = present("company_name") {
            general.entry("shop_name").or_insert_with(|| localize(name));
        }
        Ok(())
    })?;

    if UBL_INVOICE_KEYS.iter().any(|key| present(*key).is_some()) {
        changed |= modify_option(settings, keys::INVOICE_UBL, |invoice| {
            for key in UBL_INVOICE_KEYS {
                if let Some(v) = present(*key) {
                    invoice.entry(*key).or_insert(v);
                }
            }
            invoice.entry("enabled").or_insert_with(|| json!("1"));
            Ok(())
        })?;
    }

    if let Some(taxes) = settings.get(legacy::UBL_TAXES)?.filter(|t| !is_empty(t)) {
        changed |= settings.add(keys::UBL_TAXES, taxes)?;
    }

    if ctx.hooks().pretty_links_enabled() {
        ctx.hooks().request_rewrite_flush()?;
    }
    Ok(outcome(changed, "no legacy UBL settings to migrate"))
}

/// Uppercase every string stored under a `scheme` or `category` key, at
/// any depth.
fn uppercase_tax_codes(key: &str, value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                uppercase_tax_codes(k, v);
            }
        }
        Value::Array(items) => {
            for v in items {
                uppercase_tax_codes("", v);
            }
        }
        Value::String(s) if matches!(key, "scheme" | "category") => *s = s.to_uppercase(),
        _ => {}
    }
}

fn uppercase_ubl_tax_codes(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = modify_option(ctx.settings(), keys::UBL_TAXES, |taxes| {
        for (k, v) in taxes.iter_mut() {
            uppercase_tax_codes(k, v);
        }
        Ok(())
    })?;
    Ok(outcome(changed, "tax codes already uppercase"))
}

// ---------------------------------------------------------------------------
// 4.x
// ---------------------------------------------------------------------------

fn unlocalize_tax_ids(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = modify_option(ctx.settings(), keys::GENERAL, |general| {
        for key in ["vat_number", "coc_number"] {
            let plain = match general.get(key) {
                Some(Value::Object(locales)) => locales.get(DEFAULT_LOCALE).filter(|v| !v.is_null()).cloned(),
                _ => None,
            };
            if let Some(plain) = plain {
                general.insert(key.to_string(), plain);
            }
        }
        Ok(())
    })?;
    Ok(outcome(changed, "tax ids not localized"))
}

/// Replace a debug setting's value when it currently equals `from`.
fn replace_debug_value(ctx: &MigrationContext, key: &str, from: &str, to: &str) -> StepResult<bool> {
    modify_option(ctx.settings(), keys::DEBUG, |debug| {
        if debug.get(key).and_then(Value::as_str) == Some(from) {
            debug.insert(key.to_string(), json!(to));
        }
        Ok(())
    })
}

fn guest_access_to_full(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = replace_debug_value(ctx, "document_link_access_type", "guest", "full")?;
    Ok(outcome(changed, "access type is not guest"))
}

fn reload_attachment_translations(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = modify_option(ctx.settings(), keys::DEBUG, |debug| {
        debug.insert("reload_attachment_translations".to_string(), json!("1"));
        Ok(())
    })?;
    Ok(outcome(changed, "translation reload already requested"))
}

fn filesystem_method_php(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = replace_debug_value(ctx, "file_system_method", "wp", "php")?;
    Ok(outcome(changed, "file system method is not wp"))
}

fn shop_address_additional(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let changed = modify_option(ctx.settings(), keys::GENERAL, |general| {
        if !is_filled(general.get("shop_address")) || general.contains_key("shop_address_additional") {
            return Ok(());
        }
        if let Some(address) = general.remove("shop_address") {
            general.insert("shop_address_additional".to_string(), address);
        }
        Ok(())
    })?;
    Ok(outcome(changed, "shop address already moved"))
}

/// Code for `state` in `known`. A value that already is one of the codes is
/// kept; an unknown name maps to `""`.
fn state_code(known: &BTreeMap<String, String>, state: &str) -> String {
    let upper = state.to_uppercase();
    if known.contains_key(&upper) {
        return upper;
    }
    known
        .iter()
        .find(|(_, name)| name.as_str() == state)
        .map(|(code, _)| code.to_uppercase())
        .unwrap_or_default()
}

fn shop_state_codes(ctx: &MigrationContext) -> StepResult<StepOutcome> {
    let settings = ctx.settings();
    let hooks = ctx.hooks();
    let mut matched = false;

    let changed = modify_option(settings, keys::GENERAL, |general| {
        let (Some(states), Some(countries)) = (
            general.get("shop_address_state").filter(|v| !is_empty(v)),
            general.get("shop_address_country").filter(|v| !is_empty(v)),
        ) else {
            return Ok(());
        };
        matched = true;
        let states = into_map(Some(localize(states.clone())));
        let countries = into_map(Some(localize(countries.clone())));

        let mut converted = OptionMap::new();
        for (locale, state) in &states {
            let country = countries
                .get(locale)
                .or_else(|| countries.get(DEFAULT_LOCALE))
                .map(text)
                .unwrap_or_default()
                .trim()
                .to_uppercase();
            let name = text(state).trim().to_string();
            if country.is_empty() || name.is_empty() {
                converted.insert(locale.clone(), state.clone());
                continue;
            }
            let code = hooks
                .states(&country)
                .map(|known| state_code(&known, &name))
                .unwrap_or_default();
            converted.insert(locale.clone(), Value::String(code));
        }
        if !converted.is_empty() {
            general.insert("shop_address_state".to_string(), Value::Object(converted));
        }
        Ok(())
    })?;

    let mut notice_reset = false;
    if matched && settings.get(keys::SHOP_ADDRESS_NOTICE)?.is_some() {
        settings.delete(keys::SHOP_ADDRESS_NOTICE)?;
        notice_reset = true;
    }
    Ok(outcome(changed || notice_reset, "shop state already uses codes"))
}
