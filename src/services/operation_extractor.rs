//! Operation extraction from code and from step descriptions.
//!
//! Both functions are pure: unmatched input yields the empty set. The code
//! taxonomy is a fixed, ordered list of (tag, pattern) pairs matched against
//! comment-free source. The description mapping is looser and keyword based,
//! used to predict what a step will do before any code exists.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::code_text::strip_comments;
use crate::domain::models::OperationTag;

static CODE_PATTERNS: LazyLock<Vec<(OperationTag, Regex)>> = LazyLock::new(|| {
    compile(&[
        (
            OperationTag::DataLoad,
            r"(?i)\bread_(csv|tsv|table|excel|parquet|json|h5ad|loom|mtx|10x_mtx|10x_h5|feather)\b|\bsc\.read\b|\breadrds\b|\bread\.(csv|delim|table)\b|\bfread\s*\(|\bload_dataset\s*\(|\bnp\.load(txt)?\s*\(",
        ),
        (
            OperationTag::QualityControl,
            r"(?i)\b(calculate_qc_metrics|filter_cells|filter_genes|pct_counts_mt|n_genes_by_counts|scrublet|dropna|isnull|isna|drop_duplicates|percentagefeatureset)\b|\bdoublet",
        ),
        (
            OperationTag::Normalize,
            r"(?i)\b(normalize_total|normalize_per_cell|log1p|standardscaler|minmaxscaler|robustscaler|normalizedata|sctransform|zscore|quantile_transform)\b|\bpp\.scale\b|\bnormali[sz]e\s*\(",
        ),
        (
            OperationTag::FeatureSelection,
            r"(?i)\b(highly_variable_genes|selectkbest|variancethreshold|findvariablefeatures|selectfrommodel|mutual_info_classif)\b",
        ),
        (
            OperationTag::DimensionalityReduction,
            r"\b(tl|pp)\.(pca|umap|tsne|diffmap)\b|\b(PCA|IncrementalPCA|UMAP|TSNE|TruncatedSVD|NMF|FactorAnalysis)\s*\(|(?i:\b(runpca|runumap|runtsne|prcomp)\s*\()",
        ),
        (
            OperationTag::Integration,
            r"(?i)\b(harmony\w*|bbknn|combat|scanorama|mnn_correct|integratedata|findintegrationanchors|batch_correct\w*)\b",
        ),
        (
            OperationTag::Cluster,
            r"(?i)\b(leiden|louvain|kmeans|minibatchkmeans|dbscan|hdbscan|agglomerativeclustering|spectralclustering|gaussianmixture|findclusters|fcluster|linkage)\s*\(",
        ),
        (
            OperationTag::DifferentialAnalysis,
            r"(?i)\btl\.rank_genes_groups\b|\b(ttest_ind|ttest_rel|mannwhitneyu|kruskal|f_oneway|findmarkers|findallmarkers|limma|edger|deseq\w*)\b",
        ),
        (
            OperationTag::Annotation,
            r#"(?i)\b(celltypist|singler|sctype|map_cell_types)\b|\bannotate\w*\s*\(|\bcell_?types?["']?\s*\]\s*=[^=]"#,
        ),
        (
            OperationTag::Visualize,
            r"(?i)\b(plt|sns|px)\.\w+\s*\(|\bsc\.pl\.\w+|\bggplot\s*\(|\b(matplotlib|seaborn|plotly)\b|\.plot\s*\(|\bsavefig\b|\bheatmap\s*\(",
        ),
        (
            OperationTag::Persist,
            r"(?i)\.(to_csv|to_parquet|to_excel|to_json|to_pickle|write_h5ad|write_loom|write)\s*\(|\b(saverds|write\.csv|pickle\.dump|joblib\.dump)\s*\(|\bnp\.save\w*\s*\(",
        ),
    ])
});

static DESCRIPTION_PATTERNS: LazyLock<Vec<(OperationTag, Regex)>> = LazyLock::new(|| {
    compile(&[
        (
            OperationTag::DataLoad,
            r"\b(load|loading|read|reading|import|importing|ingest\w*|open)\b",
        ),
        (
            OperationTag::QualityControl,
            r"\b(quality|qc|filter\w*|doublets?|mitochondrial|outliers?|missing values?|clean\w*)\b",
        ),
        (
            OperationTag::Normalize,
            r"\b(normali[sz]\w*|scal(e|ing)|log[- ]?transform\w*|standardi[sz]\w*)\b",
        ),
        (
            OperationTag::FeatureSelection,
            r"\b(highly variable|variable (genes|features)|hvgs?|feature selection|select (top )?features)\b",
        ),
        (
            OperationTag::DimensionalityReduction,
            r"\b(pca|umap|t-?sne|dimension\w*|embedding|principal components?)\b",
        ),
        (
            OperationTag::Integration,
            r"\b(batch (effects?|correction)|integrat\w*|harmony)\b",
        ),
        (
            OperationTag::Cluster,
            r"\b(cluster\w*|leiden|louvain|k-?means)\b",
        ),
        (
            OperationTag::DifferentialAnalysis,
            r"\b(differential\w*|marker genes?|markers|degs?|de genes|enrichment|statistical tests?|compare|comparison)\b",
        ),
        (
            OperationTag::Annotation,
            r"\b(annotat\w*|cell types?|label (clusters|cells))\b",
        ),
        (
            OperationTag::Visualize,
            r"\b(plot\w*|visuali[sz]\w*|figures?|charts?|heatmaps?|graphs?)\b",
        ),
        (
            OperationTag::Persist,
            r"\b(save|saving|export\w*|write|persist\w*)\b",
        ),
    ])
});

fn compile(table: &[(OperationTag, &str)]) -> Vec<(OperationTag, Regex)> {
    table
        .iter()
        .map(|(tag, pattern)| {
            let regex = Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid pattern for {tag}: {e}"));
            (*tag, regex)
        })
        .collect()
}

/// Detects domain operations in code and step descriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationExtractor;

impl OperationExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Operations the code performs. Commented-out code does not count.
    pub fn extract(&self, code: &str) -> BTreeSet<OperationTag> {
        let source = strip_comments(code);
        CODE_PATTERNS
            .iter()
            .filter(|(_, regex)| regex.is_match(&source))
            .map(|(tag, _)| *tag)
            .collect()
    }

    /// Operations a step is likely to perform, judged from its description.
    pub fn estimate_from_description(&self, text: &str) -> BTreeSet<OperationTag> {
        let text = text.to_lowercase();
        DESCRIPTION_PATTERNS
            .iter()
            .filter(|(_, regex)| regex.is_match(&text))
            .map(|(tag, _)| *tag)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(tags: &[OperationTag]) -> BTreeSet<OperationTag> {
        tags.iter().copied().collect()
    }

    #[test]
    fn test_extract_scanpy_pipeline() {
        let code = r#"
import scanpy as sc
adata = sc.read_h5ad("pbmc.h5ad")
sc.pp.calculate_qc_metrics(adata, inplace=True)
sc.pp.normalize_total(adata, target_sum=1e4)
sc.pp.log1p(adata)
sc.pp.highly_variable_genes(adata)
sc.tl.pca(adata)
sc.tl.umap(adata)
sc.tl.leiden(adata)
sc.tl.rank_genes_groups(adata, "leiden")
sc.pl.umap(adata, color="leiden")
adata.write_h5ad("out.h5ad")
"#;
        let extractor = OperationExtractor::new();
        assert_eq!(
            extractor.extract(code),
            ops(&[
                OperationTag::DataLoad,
                OperationTag::QualityControl,
                OperationTag::Normalize,
                OperationTag::FeatureSelection,
                OperationTag::DimensionalityReduction,
                OperationTag::Cluster,
                OperationTag::DifferentialAnalysis,
                OperationTag::Visualize,
                OperationTag::Persist,
            ])
        );
    }

    #[test]
    fn test_extract_pandas_sklearn() {
        let code = "df = pd.read_csv('x.csv')\nX = StandardScaler().fit_transform(df)\nlabels = KMeans(n_clusters=3).fit_predict(X)\n";
        assert_eq!(
            OperationExtractor::new().extract(code),
            ops(&[OperationTag::DataLoad, OperationTag::Normalize, OperationTag::Cluster])
        );
    }

    #[test]
    fn test_extract_ignores_comments() {
        let code = "# sc.tl.leiden(adata)\nx = 1\n";
        assert!(OperationExtractor::new().extract(code).is_empty());
    }

    #[test]
    fn test_extract_unmatched_is_empty() {
        assert!(OperationExtractor::new().extract("").is_empty());
        assert!(OperationExtractor::new().extract("print('hello')").is_empty());
    }

    #[test]
    fn test_cluster_label_as_color_is_not_clustering() {
        let code = "sc.pl.umap(adata, color='leiden')";
        assert_eq!(
            OperationExtractor::new().extract(code),
            ops(&[OperationTag::Visualize])
        );
    }

    #[test]
    fn test_annotation_assignment() {
        let code = "adata.obs[\"cell_type\"] = adata.obs[\"leiden\"].map(mapping)";
        assert!(OperationExtractor::new()
            .extract(code)
            .contains(&OperationTag::Annotation));
        let comparison = "mask = adata.obs[\"cell_type\"] == \"T\"";
        assert!(!OperationExtractor::new()
            .extract(comparison)
            .contains(&OperationTag::Annotation));
    }

    #[test]
    fn test_estimate_from_description() {
        let extractor = OperationExtractor::new();
        assert_eq!(
            extractor.estimate_from_description("Load data"),
            ops(&[OperationTag::DataLoad])
        );
        assert_eq!(
            extractor.estimate_from_description("Normalize again"),
            ops(&[OperationTag::Normalize])
        );
        assert_eq!(
            extractor.estimate_from_description("Cluster the cells with Leiden"),
            ops(&[OperationTag::Cluster])
        );
        assert_eq!(
            extractor.estimate_from_description("Visualize"),
            ops(&[OperationTag::Visualize])
        );
        assert!(extractor
            .estimate_from_description("Summarize findings")
            .is_empty());
    }

    #[test]
    fn test_estimate_multiple_tags() {
        let estimate = OperationExtractor::new()
            .estimate_from_description("Run PCA and UMAP, then plot the embedding");
        assert_eq!(
            estimate,
            ops(&[OperationTag::DimensionalityReduction, OperationTag::Visualize])
        );
    }
}
