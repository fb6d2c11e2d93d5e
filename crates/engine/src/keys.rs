//! Names of the persisted option groups.

pub const GENERAL: &str = "wpo_wcpdf_settings_general";
pub const INVOICE: &str = "wpo_wcpdf_documents_settings_invoice";
pub const PACKING_SLIP: &str = "wpo_wcpdf_documents_settings_packing-slip";
pub const INVOICE_UBL: &str = "wpo_wcpdf_documents_settings_invoice_ubl";
pub const DEBUG: &str = "wpo_wcpdf_settings_debug";
pub const UBL_TAXES: &str = "wpo_wcpdf_settings_ubl_taxes";
pub const NEXT_INVOICE_NUMBER: &str = "wpo_wcpdf_next_invoice_number";
pub const SHOP_ADDRESS_NOTICE: &str = "wpo_wcpdf_dismiss_shop_address_notice";

/// Counter seeded from the legacy next-invoice-number option.
pub const INVOICE_COUNTER: &str = "invoice_number";

/// Options written by releases that predate the grouped layout.
pub mod legacy {
    pub const GENERAL: &str = "wpo_wcpdf_general_settings";
    pub const TEMPLATE: &str = "wpo_wcpdf_template_settings";
    pub const DEBUG: &str = "wpo_wcpdf_debug_settings";
    pub const UBL_GENERAL: &str = "ubl_wc_general";
    pub const UBL_TAXES: &str = "ubl_wc_taxes";
}
